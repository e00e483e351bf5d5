//! Hinge adversarial loss.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, activation};

/// Discriminator loss on real scores: `mean(relu(1 - d))`.
pub fn hinge_dis_real<B: Backend>(d_real: Tensor<B, 1>) -> Tensor<B, 1> {
    activation::relu(d_real.neg().add_scalar(1.0)).mean()
}

/// Discriminator loss on generated scores: `mean(relu(1 + d))`.
pub fn hinge_dis_fake<B: Backend>(d_fake: Tensor<B, 1>) -> Tensor<B, 1> {
    activation::relu(d_fake.add_scalar(1.0)).mean()
}

/// Generator loss: `-mean(d)`.
pub fn hinge_gen<B: Backend>(d_fake: Tensor<B, 1>) -> Tensor<B, 1> {
    d_fake.mean().neg()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray<f32>;

    fn scores<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 1> {
        Tensor::from_data(TensorData::from(values), device)
    }

    fn scalar<B: Backend>(x: Tensor<B, 1>) -> f32 {
        x.into_scalar().elem::<f32>()
    }

    #[test]
    fn confident_discriminator_has_zero_loss() {
        let device = Default::default();
        let real = scores::<TestBackend>(&[1.5, 2.0, 1.0], &device);
        let fake = scores::<TestBackend>(&[-1.0, -3.0, -1.2], &device);
        assert_eq!(scalar(hinge_dis_real(real)), 0.0);
        assert_eq!(scalar(hinge_dis_fake(fake)), 0.0);
    }

    #[test]
    fn margin_violations_are_averaged() {
        let device = Default::default();
        // relu(1 - d): 1.0, 0.5, 0.0, 3.0 -> mean 1.125
        let real = scores::<TestBackend>(&[0.0, 0.5, 4.0, -2.0], &device);
        assert!((scalar(hinge_dis_real(real)) - 1.125).abs() < 1e-6);
        // relu(1 + d): 1.0, 1.5, 0.0, 0.0 -> mean 0.625
        let fake = scores::<TestBackend>(&[0.0, 0.5, -4.0, -1.0], &device);
        assert!((scalar(hinge_dis_fake(fake)) - 0.625).abs() < 1e-6);
    }

    #[test]
    fn generator_loss_is_negated_mean_score() {
        let device = Default::default();
        let fake = scores::<TestBackend>(&[1.0, -3.0, 0.5, 0.5], &device);
        assert!((scalar(hinge_gen(fake)) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn generator_gradient_pushes_scores_up() {
        let device = Default::default();
        let fake = scores::<Autodiff<TestBackend>>(&[0.2, -0.7], &device).require_grad();
        let grads = hinge_gen(fake.clone()).backward();
        let grad = fake.grad(&grads).unwrap().into_data().to_vec::<f32>().unwrap();
        assert_eq!(grad, vec![-0.5, -0.5]);
    }
}
