use burn::module::Module;
use burn::nn::BatchNorm;
use burn::nn::conv::ConvTranspose2d;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::attention::SelfAttention;
use super::layers::{SpectralConvTranspose2d, batch_norm, deconv, relu, sn_deconv, tanh};

/// Spectral deconvolution, batch norm and ReLU.
#[derive(Module, Debug)]
pub struct UpBlock<B: Backend> {
    deconv: SpectralConvTranspose2d<B>,
    bn: BatchNorm<B>,
}

impl<B: Backend> UpBlock<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        padding: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            deconv: sn_deconv(in_channels, out_channels, 4, stride, padding, device),
            bn: batch_norm(out_channels, device),
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        relu(self.bn.forward(self.deconv.forward(x)))
    }
}

/// Maps latents `[b, nz]` to RGB images `[b, 3, imsize, imsize]` in `[-1, 1]`.
///
/// The first block lifts the latent to a 4x4 map with `ngf * 2^repeat`
/// channels; each following block doubles the resolution and halves the
/// channels down to `ngf`. Self-attention runs after the last two blocks, and
/// a final deconvolution produces the three colour channels.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    blocks: Vec<UpBlock<B>>,
    attn1: SelfAttention<B>,
    attn2: SelfAttention<B>,
    last: ConvTranspose2d<B>,
    imsize: usize,
    nz: usize,
}

impl<B: Backend> Generator<B> {
    /// `imsize` must be a power of two of at least 32 and `ngf` a multiple of 8.
    pub fn new(imsize: usize, nz: usize, ngf: usize, device: &B::Device) -> Self {
        let repeat = imsize.trailing_zeros() as usize - 3;
        let mut channels = ngf << repeat;
        let mut blocks = Vec::with_capacity(repeat + 1);
        blocks.push(UpBlock::new(nz, channels, 1, 0, device));
        for _ in 0..repeat {
            blocks.push(UpBlock::new(channels, channels / 2, 2, 1, device));
            channels /= 2;
        }
        Self {
            blocks,
            attn1: SelfAttention::new(ngf * 2, device),
            attn2: SelfAttention::new(ngf, device),
            last: deconv(ngf, 3, 4, 2, 1, device),
            imsize,
            nz,
        }
    }

    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, nz] = z.dims();
        let mut x = z.reshape([batch, nz, 1, 1]);
        let count = self.blocks.len();
        for (idx, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            if idx + 2 == count {
                x = self.attn1.forward(x);
            } else if idx + 1 == count {
                x = self.attn2.forward(x);
            }
        }
        tanh(self.last.forward(x))
    }

    /// Residual gates of the two attention blocks.
    pub fn gammas(&self) -> (f32, f32) {
        (self.attn1.gamma(), self.attn2.gamma())
    }

    pub fn imsize(&self) -> usize {
        self.imsize
    }

    pub fn nz(&self) -> usize {
        self.nz
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray<f32>;

    #[test]
    fn produces_images_of_requested_size() {
        let device = Default::default();
        let generator = Generator::<TestBackend>::new(32, 16, 8, &device);
        let z = Tensor::<TestBackend, 2>::random([2, 16], Distribution::Normal(0.0, 1.0), &device);
        let images = generator.forward(z);
        assert_eq!(images.dims(), [2, 3, 32, 32]);

        let values = images.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn layer_count_scales_with_image_size() {
        let device = Default::default();
        let small = Generator::<TestBackend>::new(32, 8, 8, &device);
        let large = Generator::<TestBackend>::new(64, 8, 8, &device);
        assert_eq!(small.blocks.len(), 3);
        assert_eq!(large.blocks.len(), 4);
        assert_eq!(large.attn1.channels(), 16);
        assert_eq!(large.attn2.channels(), 8);
        assert_eq!(large.gammas(), (0.0, 0.0));
        assert!(large.num_params() > small.num_params());
    }
}
