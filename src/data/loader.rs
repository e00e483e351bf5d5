use std::sync::Arc;
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, warn};

use super::{DataError, ImageFolder};

const PREFETCH_BATCHES: usize = 2;

/// Decoded images ready to upload, stored as `[len, 3, imsize, imsize]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub data: Vec<f32>,
    pub len: usize,
    pub imsize: usize,
}

impl ImageBatch {
    pub fn into_tensor<B: Backend>(self, device: &B::Device) -> Tensor<B, 4> {
        let shape = [self.len, 3, self.imsize, self.imsize];
        Tensor::from_data(TensorData::new(self.data, shape), device)
    }
}

/// Shuffled, batched iteration over an [`ImageFolder`].
///
/// Every epoch draws a fresh permutation from `seed + epoch`, so resumed runs
/// replay the same order. The trailing short batch is kept.
#[derive(Debug, Clone)]
pub struct DataLoader {
    folder: Arc<ImageFolder>,
    batch_size: usize,
    seed: u64,
}

impl DataLoader {
    pub fn new(folder: ImageFolder, batch_size: usize, seed: u64) -> Result<Self, DataError> {
        if batch_size == 0 {
            return Err(DataError::ZeroBatchSize);
        }
        Ok(Self {
            folder: Arc::new(folder),
            batch_size,
            seed,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn len(&self) -> usize {
        self.folder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folder.is_empty()
    }

    pub fn imsize(&self) -> usize {
        self.folder.imsize()
    }

    pub fn steps_per_epoch(&self) -> usize {
        self.folder.len().div_ceil(self.batch_size)
    }

    /// Index order used for `epoch`.
    pub fn permutation(&self, epoch: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.folder.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
        order.shuffle(&mut rng);
        order
    }

    /// Start decoding `epoch` on a background thread.
    pub fn epoch(&self, epoch: usize) -> Result<EpochBatches, DataError> {
        let order = self.permutation(epoch);
        let folder = Arc::clone(&self.folder);
        let batch_size = self.batch_size;
        let (sender, receiver) = sync_channel(PREFETCH_BATCHES);
        thread::Builder::new()
            .name("image-prefetch".to_string())
            .spawn(move || decode_batches(&folder, &order, batch_size, sender))
            .map_err(DataError::Spawn)?;
        Ok(EpochBatches { receiver })
    }
}

/// Batches of one epoch, in shuffled order.
pub struct EpochBatches {
    receiver: Receiver<ImageBatch>,
}

impl Iterator for EpochBatches {
    type Item = ImageBatch;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv().ok()
    }
}

fn decode_batches(
    folder: &ImageFolder,
    order: &[usize],
    batch_size: usize,
    sender: SyncSender<ImageBatch>,
) {
    let imsize = folder.imsize();
    for chunk in order.chunks(batch_size) {
        let mut data = Vec::with_capacity(chunk.len() * 3 * imsize * imsize);
        let mut len = 0;
        for &index in chunk {
            match folder.load(index) {
                Ok(pixels) => {
                    data.extend_from_slice(&pixels);
                    len += 1;
                }
                Err(err) => warn!("Skipping training image: {err}"),
            }
        }
        if len == 0 {
            continue;
        }
        if sender.send(ImageBatch { data, len, imsize }).is_err() {
            debug!("Batch consumer dropped; stopping prefetch");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::tempdir;

    fn folder_with(count: usize) -> (tempfile::TempDir, ImageFolder) {
        let dir = tempdir().unwrap();
        for idx in 0..count {
            let shade = (idx * 20) as u8;
            RgbImage::from_pixel(8, 8, Rgb([shade, shade, shade]))
                .save(dir.path().join(format!("{idx:02}.png")))
                .unwrap();
        }
        let folder = ImageFolder::open(dir.path(), 8).unwrap();
        (dir, folder)
    }

    #[test]
    fn trailing_short_batch_is_kept() {
        let (_dir, folder) = folder_with(5);
        let loader = DataLoader::new(folder, 2, 1).unwrap();
        assert_eq!(loader.steps_per_epoch(), 3);
        let sizes: Vec<usize> = loader.epoch(0).unwrap().map(|batch| batch.len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn shuffle_depends_on_seed_and_epoch() {
        let (_dir, folder) = folder_with(12);
        let loader = DataLoader::new(folder.clone(), 4, 9).unwrap();
        let again = DataLoader::new(folder, 4, 9).unwrap();
        assert_eq!(loader.permutation(3), again.permutation(3));
        assert_ne!(loader.permutation(0), loader.permutation(1));
        let mut sorted = loader.permutation(0);
        sorted.sort();
        assert_eq!(sorted, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn unreadable_images_are_skipped() {
        let (dir, _) = folder_with(3);
        fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let folder = ImageFolder::open(dir.path(), 8).unwrap();
        assert_eq!(folder.len(), 4);
        let loader = DataLoader::new(folder, 8, 0).unwrap();
        let batches: Vec<ImageBatch> = loader.epoch(0).unwrap().collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len, 3);
        assert_eq!(batches[0].data.len(), 3 * 3 * 8 * 8);
    }

    #[test]
    fn batch_uploads_as_nchw_tensor() {
        let (_dir, folder) = folder_with(2);
        let loader = DataLoader::new(folder, 2, 0).unwrap();
        let batch = loader.epoch(0).unwrap().next().unwrap();
        let tensor = batch.into_tensor::<NdArray<f32>>(&Default::default());
        assert_eq!(tensor.dims(), [2, 3, 8, 8]);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let (_dir, folder) = folder_with(1);
        assert!(matches!(
            DataLoader::new(folder, 0, 0),
            Err(DataError::ZeroBatchSize)
        ));
    }
}
