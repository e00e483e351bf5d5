use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use super::attention::SelfAttention;
use super::layers::{SpectralConv2d, conv, lrelu, sn_conv};

/// Scores RGB images `[b, 3, imsize, imsize]` with one unbounded logit each.
///
/// Strided spectral convolutions halve the resolution down to 4x4 while
/// doubling the channels from `ndf`; self-attention follows the last two of
/// them and a 4x4 convolution collapses the map to a single score.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    blocks: Vec<SpectralConv2d<B>>,
    attn1: SelfAttention<B>,
    attn2: SelfAttention<B>,
    last: Conv2d<B>,
}

impl<B: Backend> Discriminator<B> {
    /// `imsize` must be a power of two of at least 32 and `ndf` a multiple of 8.
    pub fn new(imsize: usize, ndf: usize, device: &B::Device) -> Self {
        let repeat = imsize.trailing_zeros() as usize - 2;
        let mut blocks = Vec::with_capacity(repeat);
        blocks.push(sn_conv(3, ndf, 4, 2, 1, device));
        let mut channels = ndf;
        for _ in 1..repeat {
            blocks.push(sn_conv(channels, channels * 2, 4, 2, 1, device));
            channels *= 2;
        }
        Self {
            blocks,
            attn1: SelfAttention::new(channels / 2, device),
            attn2: SelfAttention::new(channels, device),
            last: conv(channels, 1, 4, 1, 0, device),
        }
    }

    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        let batch = images.dims()[0];
        let mut x = images;
        let count = self.blocks.len();
        for (idx, block) in self.blocks.iter().enumerate() {
            x = lrelu(block.forward(x));
            if idx + 2 == count {
                x = self.attn1.forward(x);
            } else if idx + 1 == count {
                x = self.attn2.forward(x);
            }
        }
        self.last.forward(x).reshape([batch])
    }

    /// Residual gates of the two attention blocks.
    pub fn gammas(&self) -> (f32, f32) {
        (self.attn1.gamma(), self.attn2.gamma())
    }
}
