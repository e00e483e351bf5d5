//! Image-folder dataset and shuffled batch loading.

mod folder;
mod loader;

use std::path::PathBuf;

use thiserror::Error;

pub use folder::{ImageFolder, resize_center_crop, to_chw};
pub use loader::{DataLoader, EpochBatches, ImageBatch};

/// Errors while collecting or decoding training images.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Dataset directory {0} does not exist or is not a directory")]
    InvalidRoot(PathBuf),
    #[error("No images found under {0}")]
    Empty(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("Image index {0} is out of range")]
    IndexOutOfRange(usize),
    #[error("Batch size must be greater than zero")]
    ZeroBatchSize,
    #[error("Failed to start image prefetch thread: {0}")]
    Spawn(std::io::Error),
}
