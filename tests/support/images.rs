use std::path::Path;

use image::{Rgb, RgbImage};

/// Write `count` small gradient PNGs of `width` x `height` into `dir`.
pub fn write_faces(dir: &Path, count: usize, width: u32, height: u32) {
    std::fs::create_dir_all(dir).unwrap();
    for idx in 0..count {
        let image = RgbImage::from_fn(width, height, |x, y| {
            let r = (x * 255 / width.max(1)) as u8;
            let g = (y * 255 / height.max(1)) as u8;
            Rgb([r, g, (idx * 40 % 256) as u8])
        });
        image.save(dir.join(format!("face_{idx:03}.png"))).unwrap();
    }
}
