//! Self-attention over convolutional feature maps (SAGAN, arXiv:1805.08318).

use burn::module::{Module, Param};
use burn::nn::conv::Conv2d;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor, activation};

use super::layers::conv1x1;

/// Self-attention block whose output is `gamma * o + x`.
///
/// `gamma` starts at zero, so a fresh block is the identity and the network
/// learns how much non-local evidence to mix in.
#[derive(Module, Debug)]
pub struct SelfAttention<B: Backend> {
    f: Conv2d<B>,
    g: Conv2d<B>,
    h: Conv2d<B>,
    v: Conv2d<B>,
    gamma: Param<Tensor<B, 1>>,
    channels: usize,
}

impl<B: Backend> SelfAttention<B> {
    /// `channels` must be a multiple of 8.
    pub fn new(channels: usize, device: &B::Device) -> Self {
        let k = channels / 8;
        Self {
            f: conv1x1(channels, k, device),
            g: conv1x1(channels, k, device),
            h: conv1x1(channels, channels / 2, device),
            v: conv1x1(channels / 2, channels, device),
            gamma: Param::from_tensor(Tensor::zeros([1], device)),
            channels,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let (out, _) = self.forward_with_map(x);
        out
    }

    /// Forward pass that also returns the `[b, n, n]` attention map.
    pub fn forward_with_map(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 3>) {
        let [batch, channels, width, height] = x.dims();
        let n = width * height;

        let f = self
            .f
            .forward(x.clone())
            .reshape([batch, channels / 8, n])
            .swap_dims(1, 2);
        let g = self.g.forward(x.clone()).reshape([batch, channels / 8, n]);
        let h = self.h.forward(x.clone()).reshape([batch, channels / 2, n]);

        let scores = f.matmul(g);
        let beta = activation::softmax(scores, 2).swap_dims(1, 2);

        let out = h.matmul(beta.clone()).reshape([batch, channels / 2, width, height]);
        let out = self.v.forward(out);

        let gamma = self.gamma.val().reshape([1, 1, 1, 1]);
        (out.mul(gamma).add(x), beta)
    }

    /// Current value of the residual gate.
    pub fn gamma(&self) -> f32 {
        self.gamma.val().into_scalar().elem::<f32>()
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}
