//! Latent sampling and instance noise.
//!
//! Latents are drawn on the host from a seeded `StdRng`, so runs with the
//! same seed start from the same `z` on every backend. Instance noise is
//! sampled on the device by the backend RNG.

use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Seeded standard-normal sampler.
#[derive(Debug, Clone)]
pub struct LatentSampler {
    rng: StdRng,
}

impl LatentSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `len` draws from N(0, std^2).
    pub fn normal_vec(&mut self, len: usize, std: f32) -> Vec<f32> {
        (&mut self.rng)
            .sample_iter::<f32, _>(StandardNormal)
            .take(len)
            .map(|value| value * std)
            .collect()
    }

    /// Gaussian tensor of arbitrary shape.
    pub fn normal<B: Backend, const D: usize>(
        &mut self,
        shape: [usize; D],
        std: f32,
        device: &B::Device,
    ) -> Tensor<B, D> {
        let len = shape.iter().product();
        let data = TensorData::new(self.normal_vec(len, std), shape);
        Tensor::from_data(data, device)
    }

    /// Latent batch `[batch, nz]`.
    pub fn latents<B: Backend>(&mut self, batch: usize, nz: usize, device: &B::Device) -> Tensor<B, 2> {
        self.normal([batch, nz], 1.0, device)
    }
}

/// Instance-noise standard deviation at a step within the current epoch.
///
/// Anneals linearly from `sigma` at step 0 to 0 at step `iters` and stays at
/// 0 afterwards. The schedule restarts with every epoch.
pub fn instance_noise_sigma(step: usize, sigma: f32, iters: usize) -> f32 {
    if iters == 0 || step > iters {
        return 0.0;
    }
    (1.0 - step as f32 / iters as f32) * sigma
}

/// Return `images` plus N(0, sigma^2) noise; unchanged when `sigma` is zero.
pub fn add_instance_noise<B: Backend>(images: Tensor<B, 4>, sigma: f32) -> Tensor<B, 4> {
    if sigma <= 0.0 {
        return images;
    }
    let noise = Tensor::random(
        images.shape(),
        Distribution::Normal(0.0, f64::from(sigma)),
        &images.device(),
    );
    images.add(noise)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn sigma_anneals_linearly_then_stays_off() {
        assert_eq!(instance_noise_sigma(0, 0.1, 100), 0.1);
        assert!((instance_noise_sigma(50, 0.1, 100) - 0.05).abs() < 1e-7);
        assert_eq!(instance_noise_sigma(100, 0.1, 100), 0.0);
        assert_eq!(instance_noise_sigma(101, 0.1, 100), 0.0);
        assert_eq!(instance_noise_sigma(0, 0.1, 0), 0.0);
    }

    #[test]
    fn same_seed_gives_same_draws() {
        let mut a = LatentSampler::new(7);
        let mut b = LatentSampler::new(7);
        assert_eq!(a.normal_vec(33, 1.0), b.normal_vec(33, 1.0));
        let mut c = LatentSampler::new(8);
        assert_ne!(a.normal_vec(8, 1.0), c.normal_vec(8, 1.0));
    }

    #[test]
    fn draws_have_unit_moments() {
        let mut sampler = LatentSampler::new(42);
        let values = sampler.normal_vec(20_000, 1.0);
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "var {var}");
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn latents_have_requested_shape() {
        let device = Default::default();
        let z = LatentSampler::new(1).latents::<TestBackend>(4, 16, &device);
        assert_eq!(z.dims(), [4, 16]);
    }

    #[test]
    fn zero_sigma_leaves_images_untouched() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::ones([2, 3, 4, 4], &device);
        let out = add_instance_noise(images, 0.0);
        let values = out.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn noise_spread_follows_sigma() {
        let device = Default::default();
        let images = Tensor::<TestBackend, 4>::zeros([4, 3, 16, 16], &device);
        let values = add_instance_noise(images, 0.5)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32).sqrt();
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((std - 0.5).abs() < 0.05, "std {std}");
    }
}
