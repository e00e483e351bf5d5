//! Convolution, normalization and activation building blocks.

use burn::module::{Module, Param, RunningState};
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d};
use burn::tensor::backend::Backend;
use burn::tensor::module::{conv_transpose2d, conv2d};
use burn::tensor::ops::{ConvOptions, ConvTransposeOptions};
use burn::tensor::{Distribution, Tensor, activation};

/// Standard deviation used for every freshly initialised convolution weight.
pub const WEIGHT_INIT_STD: f64 = 0.02;
/// Slope of the discriminator's leaky ReLU.
pub const LRELU_SLOPE: f64 = 0.1;

const NORM_EPS: f64 = 1e-12;

/// Plain 1x1 convolution with bias.
pub fn conv1x1<B: Backend>(in_channels: usize, out_channels: usize, device: &B::Device) -> Conv2d<B> {
    conv(in_channels, out_channels, 1, 1, 0, device)
}

/// Plain convolution with bias.
pub fn conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(true)
        .with_initializer(Initializer::Normal {
            mean: 0.0,
            std: WEIGHT_INIT_STD,
        })
        .init(device)
}

/// Plain transposed convolution with bias.
pub fn deconv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding([padding, padding])
        .with_bias(true)
        .with_initializer(Initializer::Normal {
            mean: 0.0,
            std: WEIGHT_INIT_STD,
        })
        .init(device)
}

/// Spectrally normalized convolution (discriminator).
pub fn sn_conv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> SpectralConv2d<B> {
    SpectralConv2d::new(in_channels, out_channels, kernel_size, stride, padding, device)
}

/// Spectrally normalized transposed convolution (generator).
pub fn sn_deconv<B: Backend>(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
    device: &B::Device,
) -> SpectralConvTranspose2d<B> {
    SpectralConvTranspose2d::new(in_channels, out_channels, kernel_size, stride, padding, device)
}

/// Batch normalization with eps 1e-5 and momentum 0.1.
pub fn batch_norm<B: Backend>(num_features: usize, device: &B::Device) -> BatchNorm<B> {
    BatchNormConfig::new(num_features)
        .with_epsilon(1e-5)
        .with_momentum(0.1)
        .init(device)
}

pub fn lrelu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    activation::leaky_relu(x, LRELU_SLOPE)
}

pub fn relu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    activation::relu(x)
}

pub fn tanh<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    activation::tanh(x)
}

/// Map generator output from `[-1, 1]` back to `[0, 1]`.
pub fn denorm<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.add_scalar(1.0).div_scalar(2.0).clamp(0.0, 1.0)
}

/// Persistent power-iteration state for one weight.
///
/// `u` approximates the leading left singular vector of the weight viewed as
/// a `[rows, rest]` matrix, where `rows` is the size of the normalized
/// dimension. It is refined by one iteration per forward pass while autodiff
/// is enabled and stays frozen for inference.
#[derive(Module, Debug)]
pub struct SpectralNorm<B: Backend> {
    u: RunningState<Tensor<B, 1>>,
    dim: usize,
}

impl<B: Backend> SpectralNorm<B> {
    fn new(rows: usize, dim: usize, device: &B::Device) -> Self {
        let u = Tensor::<B, 1>::random([rows], Distribution::Normal(0.0, 1.0), device);
        Self {
            u: RunningState::new(l2_normalize(u)),
            dim,
        }
    }

    /// Divide `weight` by its estimated largest singular value.
    pub fn normalize(&self, weight: Tensor<B, 4>) -> Tensor<B, 4> {
        let matrix = if self.dim == 0 {
            weight.clone()
        } else {
            weight.clone().swap_dims(0, self.dim)
        };
        let [rows, a, b, c] = matrix.dims();
        let matrix = matrix.reshape([rows, a * b * c]);

        let frozen = matrix.clone().detach();
        let u = self.u.value().reshape([rows, 1]);
        let v = l2_normalize(frozen.clone().transpose().matmul(u));
        let u = l2_normalize(frozen.matmul(v.clone()));
        if B::ad_enabled() {
            self.u.update(u.clone().reshape([rows]).detach());
        }

        let sigma = u.transpose().matmul(matrix.matmul(v));
        weight.div(sigma.reshape([1, 1, 1, 1]))
    }

    /// Current singular-vector estimate.
    pub fn u(&self) -> Tensor<B, 1> {
        self.u.value()
    }
}

fn l2_normalize<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let norm = (x.clone() * x.clone()).sum().sqrt().add_scalar(NORM_EPS);
    let shape = [1; D];
    x.div(norm.reshape(shape))
}

/// `Conv2d` whose weight is spectrally normalized on every forward pass.
#[derive(Module, Debug)]
pub struct SpectralConv2d<B: Backend> {
    weight: Param<Tensor<B, 4>>,
    bias: Param<Tensor<B, 1>>,
    sn: SpectralNorm<B>,
    stride: usize,
    padding: usize,
}

impl<B: Backend> SpectralConv2d<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        device: &B::Device,
    ) -> Self {
        let weight = Tensor::random(
            [out_channels, in_channels, kernel_size, kernel_size],
            Distribution::Normal(0.0, WEIGHT_INIT_STD),
            device,
        );
        Self {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(Tensor::zeros([out_channels], device)),
            sn: SpectralNorm::new(out_channels, 0, device),
            stride,
            padding,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let weight = self.sn.normalize(self.weight.val());
        conv2d(
            x,
            weight,
            Some(self.bias.val()),
            ConvOptions::new(
                [self.stride, self.stride],
                [self.padding, self.padding],
                [1, 1],
                1,
            ),
        )
    }

    /// Spectrally normalized weight as used by `forward`.
    pub fn normalized_weight(&self) -> Tensor<B, 4> {
        self.sn.normalize(self.weight.val())
    }
}

/// `ConvTranspose2d` whose weight is spectrally normalized along the output
/// channel dimension (dim 1 of `[in, out, k, k]`).
#[derive(Module, Debug)]
pub struct SpectralConvTranspose2d<B: Backend> {
    weight: Param<Tensor<B, 4>>,
    bias: Param<Tensor<B, 1>>,
    sn: SpectralNorm<B>,
    stride: usize,
    padding: usize,
}

impl<B: Backend> SpectralConvTranspose2d<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        device: &B::Device,
    ) -> Self {
        let weight = Tensor::random(
            [in_channels, out_channels, kernel_size, kernel_size],
            Distribution::Normal(0.0, WEIGHT_INIT_STD),
            device,
        );
        Self {
            weight: Param::from_tensor(weight),
            bias: Param::from_tensor(Tensor::zeros([out_channels], device)),
            sn: SpectralNorm::new(out_channels, 1, device),
            stride,
            padding,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let weight = self.sn.normalize(self.weight.val());
        conv_transpose2d(
            x,
            weight,
            Some(self.bias.val()),
            ConvTransposeOptions::new(
                [self.stride, self.stride],
                [self.padding, self.padding],
                [0, 0],
                [1, 1],
                1,
            ),
        )
    }

    /// Spectrally normalized weight as used by `forward`.
    pub fn normalized_weight(&self) -> Tensor<B, 4> {
        self.sn.normalize(self.weight.val())
    }
}
