use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{DynamicImage, imageops::FilterType};
use tracing::{info, warn};

use super::DataError;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Every decodable image below a root directory, in sorted path order.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    root: PathBuf,
    paths: Vec<PathBuf>,
    imsize: usize,
}

impl ImageFolder {
    /// Recursively collect image files under `root`.
    pub fn open(root: impl AsRef<Path>, imsize: usize) -> Result<Self, DataError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(DataError::InvalidRoot(root));
        }
        let mut paths = Vec::new();
        visit_dir(&root, &mut |path| paths.push(path.to_path_buf()))?;
        if paths.is_empty() {
            return Err(DataError::Empty(root));
        }
        paths.sort();
        info!("Found {} images under {}", paths.len(), root.display());
        Ok(Self {
            root,
            paths,
            imsize,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn imsize(&self) -> usize {
        self.imsize
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Decode image `index` into normalized CHW floats.
    pub fn load(&self, index: usize) -> Result<Vec<f32>, DataError> {
        let path = self
            .paths
            .get(index)
            .ok_or(DataError::IndexOutOfRange(index))?;
        let image = image::open(path).map_err(|source| DataError::Decode {
            path: path.clone(),
            source,
        })?;
        Ok(to_chw(&resize_center_crop(image, self.imsize)))
    }
}

/// Resize so the short side equals `size`, then crop the centre square.
pub fn resize_center_crop(image: DynamicImage, size: usize) -> DynamicImage {
    let size = size as u32;
    let (width, height) = (image.width().max(1), image.height().max(1));
    let (new_width, new_height) = if width <= height {
        let scaled = (height as u64 * size as u64 / width as u64) as u32;
        (size, scaled.max(size))
    } else {
        let scaled = (width as u64 * size as u64 / height as u64) as u32;
        (scaled.max(size), size)
    };
    let resized = if (new_width, new_height) == (width, height) {
        image
    } else {
        image.resize_exact(new_width, new_height, FilterType::Triangle)
    };
    let left = (new_width - size) / 2;
    let top = (new_height - size) / 2;
    resized.crop_imm(left, top, size, size)
}

/// RGB pixels as planar CHW values scaled to `[-1, 1]`.
pub fn to_chw(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let plane = (width * height) as usize;
    let mut out = vec![0.0f32; plane * 3];
    for (idx, pixel) in rgb.pixels().enumerate() {
        for channel in 0..3 {
            out[channel * plane + idx] = pixel[channel] as f32 / 127.5 - 1.0;
        }
    }
    out
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn visit_dir(root: &Path, visitor: &mut impl FnMut(&Path)) -> Result<(), DataError> {
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(source) if dir != root => {
                warn!(
                    dir = %dir.display(),
                    error = %source,
                    "Failed to read directory while collecting images"
                );
                continue;
            }
            Err(source) => {
                return Err(DataError::Io {
                    path: dir.clone(),
                    source,
                });
            }
        };
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() && is_image(&path) {
                visitor(&path);
            }
        }
    }
    Ok(())
}
