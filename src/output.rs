//! PNG sample grids and loss-history plots.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use image::{Rgb, RgbImage};
use thiserror::Error;

use crate::checkpoint::TrainingHistory;
use crate::model::layers::denorm;

pub const GRID_COLUMNS: usize = 8;
pub const GRID_PADDING: usize = 2;

const PLOT_WIDTH: u32 = 800;
const PLOT_HEIGHT: u32 = 480;
const PLOT_MARGIN: u32 = 40;
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([64, 64, 64]);
const GRID_LINE: Rgb<u8> = Rgb([225, 225, 225]);
const SERIES_COLORS: [Rgb<u8>; 4] = [
    Rgb([31, 119, 180]),
    Rgb([44, 160, 44]),
    Rgb([214, 39, 40]),
    Rgb([255, 127, 14]),
];
const SERIES_LABELS: [&str; 4] = ["d loss", "d real", "d fake", "g loss"];
const LEGEND_ENTRY: u32 = 72;
const LEGEND_SWATCH: u32 = 10;
const GLYPH_WIDTH: u32 = 5;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Image data has {actual} values, expected {expected}")]
    Shape { expected: usize, actual: usize },
    #[error("Unable to read tensor data: {0}")]
    TensorData(String),
}

/// Tile `[n, 3, h, w]` values in `[0, 1]` into one image.
///
/// Rows hold `nrow` images; each tile is surrounded by `padding` pixels of
/// `pad_value`.
pub fn make_grid(
    values: &[f32],
    shape: [usize; 4],
    nrow: usize,
    padding: usize,
    pad_value: u8,
) -> Result<RgbImage, OutputError> {
    let [count, channels, height, width] = shape;
    let expected = count * channels * height * width;
    if values.len() != expected || channels != 3 {
        return Err(OutputError::Shape {
            expected: count * 3 * height * width,
            actual: values.len(),
        });
    }
    let columns = nrow.max(1).min(count.max(1));
    let rows = count.div_ceil(columns);
    let grid_width = columns * (width + padding) + padding;
    let grid_height = rows * (height + padding) + padding;
    let mut grid = RgbImage::from_pixel(
        grid_width as u32,
        grid_height as u32,
        Rgb([pad_value; 3]),
    );
    let plane = height * width;
    for index in 0..count {
        let left = (index % columns) * (width + padding) + padding;
        let top = (index / columns) * (height + padding) + padding;
        let base = index * 3 * plane;
        for y in 0..height {
            for x in 0..width {
                let offset = base + y * width + x;
                let pixel = Rgb([
                    to_u8(values[offset]),
                    to_u8(values[offset + plane]),
                    to_u8(values[offset + 2 * plane]),
                ]);
                grid.put_pixel((left + x) as u32, (top + y) as u32, pixel);
            }
        }
    }
    Ok(grid)
}

/// Grid of generator output in `[-1, 1]`, eight images per row.
pub fn tensor_grid<B: Backend>(images: Tensor<B, 4>) -> Result<RgbImage, OutputError> {
    unit_tensor_grid(denorm(images))
}

/// Grid of images already mapped to `[0, 1]`.
pub fn unit_tensor_grid<B: Backend>(images: Tensor<B, 4>) -> Result<RgbImage, OutputError> {
    let shape = images.dims();
    let values = images
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| OutputError::TensorData(format!("{err:?}")))?;
    make_grid(&values, shape, GRID_COLUMNS, GRID_PADDING, 0)
}

/// Save `image` as PNG, creating parent directories.
pub fn save_grid(path: &Path, image: &RgbImage) -> Result<(), OutputError> {
    ensure_parent(path)?;
    image.save(path).map_err(|source| OutputError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Draw discriminator and generator losses per epoch, with a labelled legend.
///
/// Series colours: d loss blue, d real green, d fake red, g loss orange.
pub fn plot_history(history: &TrainingHistory, path: &Path) -> Result<(), OutputError> {
    let image = render_history(history);
    save_grid(path, &image)
}

pub fn render_history(history: &TrainingHistory) -> RgbImage {
    let mut image = RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND);
    let series: [&[f32]; 4] = [
        &history.d_loss,
        &history.d_loss_real,
        &history.d_loss_fake,
        &history.g_loss,
    ];
    let (mut low, mut high) = series
        .iter()
        .flat_map(|values| values.iter().copied())
        .filter(|value| value.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !low.is_finite() || !high.is_finite() {
        low = 0.0;
        high = 1.0;
    }
    if (high - low).abs() < f32::EPSILON {
        low -= 0.5;
        high += 0.5;
    }
    let left = PLOT_MARGIN as f32;
    let right = (PLOT_WIDTH - PLOT_MARGIN) as f32;
    let top = PLOT_MARGIN as f32;
    let bottom = (PLOT_HEIGHT - PLOT_MARGIN) as f32;

    for tick in 0..=4 {
        let y = top + (bottom - top) * tick as f32 / 4.0;
        draw_line(&mut image, (left, y), (right, y), GRID_LINE);
    }
    if low < 0.0 && high > 0.0 {
        let zero = bottom - (0.0 - low) / (high - low) * (bottom - top);
        draw_line(&mut image, (left, zero), (right, zero), AXIS);
    }
    draw_line(&mut image, (left, top), (left, bottom), AXIS);
    draw_line(&mut image, (left, bottom), (right, bottom), AXIS);

    let points = history.len();
    for (values, color) in series.iter().zip(SERIES_COLORS) {
        let project = |idx: usize, value: f32| {
            let x = if points > 1 {
                left + (right - left) * idx as f32 / (points - 1) as f32
            } else {
                (left + right) / 2.0
            };
            let y = bottom - (value - low) / (high - low) * (bottom - top);
            (x, y)
        };
        let mut previous = None;
        for (idx, value) in values.iter().enumerate() {
            if !value.is_finite() {
                previous = None;
                continue;
            }
            let point = project(idx, *value);
            match previous {
                Some(start) => draw_line(&mut image, start, point, color),
                None => draw_line(&mut image, point, point, color),
            }
            previous = Some(point);
        }
    }

    let legend_y = PLOT_MARGIN / 2 - LEGEND_SWATCH / 2;
    for (slot, (color, label)) in SERIES_COLORS.iter().zip(SERIES_LABELS).enumerate() {
        let x0 = legend_x(slot);
        fill_rect(&mut image, x0, legend_y, LEGEND_SWATCH, LEGEND_SWATCH, *color);
        draw_text(&mut image, x0 + LEGEND_SWATCH + 4, legend_y + 2, label, AXIS);
    }
    image
}

fn legend_x(slot: usize) -> u32 {
    PLOT_WIDTH - PLOT_MARGIN - LEGEND_ENTRY * (SERIES_LABELS.len() - slot) as u32
}

/// CSV with one row per recorded epoch.
pub fn history_csv(history: &TrainingHistory) -> String {
    let mut out = String::from(
        "epoch,d_loss,d_loss_real,d_loss_fake,d_gamma1,d_gamma2,g_loss,g_gamma1,g_gamma2\n",
    );
    for index in 0..history.len() {
        let Some((epoch, stats)) = history.row(index) else {
            break;
        };
        let _ = writeln!(
            out,
            "{epoch},{},{},{},{},{},{},{},{}",
            stats.d_loss,
            stats.d_loss_real,
            stats.d_loss_fake,
            stats.d_gamma1,
            stats.d_gamma2,
            stats.g_loss,
            stats.g_gamma1,
            stats.g_gamma2
        );
    }
    out
}

pub fn write_history_csv(history: &TrainingHistory, path: &Path) -> Result<(), OutputError> {
    ensure_parent(path)?;
    fs::write(path, history_csv(history)).map_err(|source| OutputError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn to_u8(value: f32) -> u8 {
    (value * 255.0 + 0.5).clamp(0.0, 255.0) as u8
}

fn ensure_parent(path: &Path) -> Result<(), OutputError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| OutputError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

fn draw_line(image: &mut RgbImage, from: (f32, f32), to: (f32, f32), color: Rgb<u8>) {
    let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil() as usize;
    for step in 0..=steps {
        let t = if steps == 0 {
            0.0
        } else {
            step as f32 / steps as f32
        };
        let x = (from.0 + (to.0 - from.0) * t).round();
        let y = (from.1 + (to.1 - from.1) * t).round();
        if x >= 0.0 && y >= 0.0 && (x as u32) < image.width() && (y as u32) < image.height() {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn fill_rect(image: &mut RgbImage, x0: u32, y0: u32, width: u32, height: u32, color: Rgb<u8>) {
    for y in y0..(y0 + height).min(image.height()) {
        for x in x0..(x0 + width).min(image.width()) {
            image.put_pixel(x, y, color);
        }
    }
}

/// 5x7 bitmaps for the lowercase letters used by the legend, one row per
/// byte with the leftmost pixel in bit 4.
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'a' => [0x00, 0x00, 0x0e, 0x01, 0x0f, 0x11, 0x0f],
        'd' => [0x01, 0x01, 0x0f, 0x11, 0x11, 0x11, 0x0f],
        'e' => [0x00, 0x00, 0x0e, 0x11, 0x1f, 0x10, 0x0e],
        'f' => [0x06, 0x09, 0x08, 0x1c, 0x08, 0x08, 0x08],
        'g' => [0x00, 0x0f, 0x11, 0x11, 0x0f, 0x01, 0x0e],
        'k' => [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12],
        'l' => [0x0c, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0e],
        'o' => [0x00, 0x00, 0x0e, 0x11, 0x11, 0x11, 0x0e],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        's' => [0x00, 0x00, 0x0f, 0x10, 0x0e, 0x01, 0x1e],
        _ => return None,
    };
    Some(rows)
}

/// Characters without a glyph (spaces) only advance the pen.
fn draw_text(image: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    for (idx, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else {
            continue;
        };
        let left = x + idx as u32 * GLYPH_ADVANCE;
        for (dy, row) in rows.iter().enumerate() {
            for dx in 0..GLYPH_WIDTH {
                if row & (1 << (GLYPH_WIDTH - 1 - dx)) != 0 {
                    fill_rect(image, left + dx, y + dy as u32, 1, 1, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::EpochStats;
    use burn::backend::NdArray;
    use tempfile::tempdir;

    fn solid(count: usize, value: f32, size: usize) -> Vec<f32> {
        vec![value; count * 3 * size * size]
    }

    #[test]
    fn grid_dimensions_follow_padding_and_columns() {
        let grid = make_grid(&solid(10, 1.0, 4), [10, 3, 4, 4], 8, 2, 0).unwrap();
        // 8 columns * (4 + 2) + 2, 2 rows * (4 + 2) + 2
        assert_eq!(grid.dimensions(), (50, 14));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(2, 2), &Rgb([255, 255, 255]));
        // Unused slots of the last row stay padding.
        assert_eq!(grid.get_pixel(48, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn fewer_images_than_columns_shrink_the_grid() {
        let grid = make_grid(&solid(3, 0.5, 2), [3, 3, 2, 2], 8, 2, 0).unwrap();
        assert_eq!(grid.dimensions(), (14, 6));
        assert_eq!(grid.get_pixel(2, 2), &Rgb([128, 128, 128]));
    }

    #[test]
    fn pixel_values_are_rounded_and_clamped() {
        assert_eq!(to_u8(-0.3), 0);
        assert_eq!(to_u8(1.7), 255);
        assert_eq!(to_u8(0.5), 128);
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        assert!(matches!(
            make_grid(&[0.0; 5], [1, 3, 2, 2], 8, 2, 0),
            Err(OutputError::Shape { expected: 12, actual: 5 })
        ));
    }

    #[test]
    fn tensor_grid_denormalizes_generator_range() {
        let device = Default::default();
        let images = Tensor::<NdArray<f32>, 4>::full([2, 3, 4, 4], -1.0, &device);
        let grid = tensor_grid(images).unwrap();
        assert_eq!(grid.dimensions(), (14, 8));
        assert_eq!(grid.get_pixel(3, 3), &Rgb([0, 0, 0]));
    }

    #[test]
    fn history_outputs_are_written() {
        let dir = tempdir().unwrap();
        let mut history = TrainingHistory::default();
        history.push(
            1,
            EpochStats {
                d_loss: 2.0,
                g_loss: 0.5,
                ..EpochStats::default()
            },
        );
        history.push(
            2,
            EpochStats {
                d_loss: 1.5,
                g_loss: 0.25,
                ..EpochStats::default()
            },
        );
        let png = dir.path().join("plots").join("loss.png");
        let csv = dir.path().join("loss.csv");
        plot_history(&history, &png).unwrap();
        write_history_csv(&history, &csv).unwrap();

        let image = image::open(&png).unwrap();
        assert_eq!((image.width(), image.height()), (PLOT_WIDTH, PLOT_HEIGHT));
        let text = fs::read_to_string(&csv).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "1,2,0,0,0,0,0.5,0,0");
    }

    #[test]
    fn empty_history_still_renders() {
        let image = render_history(&TrainingHistory::default());
        assert_eq!(image.dimensions(), (PLOT_WIDTH, PLOT_HEIGHT));
    }

    #[test]
    fn legend_labels_every_series() {
        for label in SERIES_LABELS {
            assert!(
                label.chars().all(|ch| ch == ' ' || glyph(ch).is_some()),
                "{label}"
            );
        }
        let image = render_history(&TrainingHistory::default());
        let legend_y = PLOT_MARGIN / 2 - LEGEND_SWATCH / 2;
        for (slot, (color, label)) in SERIES_COLORS.iter().zip(SERIES_LABELS).enumerate() {
            let x0 = legend_x(slot);
            assert_eq!(image.get_pixel(x0 + 1, legend_y + 1), color);
            let text_left = x0 + LEGEND_SWATCH + 4;
            let text_right = text_left + label.len() as u32 * GLYPH_ADVANCE;
            let inked = (text_left..text_right)
                .flat_map(|x| (legend_y + 2..legend_y + 9).map(move |y| (x, y)))
                .filter(|(x, y)| *image.get_pixel(*x, *y) == AXIS)
                .count();
            assert!(inked > 20, "{label} has {inked} text pixels");
        }
    }
}
