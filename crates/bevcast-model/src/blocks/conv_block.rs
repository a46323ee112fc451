//! ConvBlock - convolution, optional normalization, optional activation.
//!
//! The universal building primitive of the temporal engine. The convolution
//! variant, normalization and activation are fixed when the block is built;
//! selectors are parsed into enums up front so unknown names fail before any
//! tensor is touched.

use std::fmt;
use std::str::FromStr;

use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, InstanceNorm, InstanceNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;
use serde::{Deserialize, Serialize};

use bevcast_core::error::{BevError, Result as BevResult};

/// Normalization applied after the convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormKind {
    #[default]
    #[serde(rename = "bn")]
    BatchNorm,
    #[serde(rename = "in")]
    InstanceNorm,
    #[serde(rename = "none")]
    None,
}

impl NormKind {
    const EXPECTED: &'static str = "bn, in, none";

    pub fn as_str(&self) -> &'static str {
        match self {
            NormKind::BatchNorm => "bn",
            NormKind::InstanceNorm => "in",
            NormKind::None => "none",
        }
    }
}

impl FromStr for NormKind {
    type Err = BevError;

    fn from_str(s: &str) -> BevResult<Self> {
        match s {
            "bn" => Ok(NormKind::BatchNorm),
            "in" => Ok(NormKind::InstanceNorm),
            "none" => Ok(NormKind::None),
            other => Err(BevError::unknown_variant("norm", other, Self::EXPECTED)),
        }
    }
}

impl fmt::Display for NormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Activation applied last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActivationKind {
    #[default]
    #[serde(rename = "relu")]
    Relu,
    /// Leaky ReLU with negative slope 0.1
    #[serde(rename = "lrelu")]
    LeakyRelu,
    #[serde(rename = "elu")]
    Elu,
    #[serde(rename = "tanh")]
    Tanh,
    #[serde(rename = "none")]
    None,
}

impl ActivationKind {
    const EXPECTED: &'static str = "relu, lrelu, elu, tanh, none";

    /// Negative slope of [`ActivationKind::LeakyRelu`].
    pub const LEAKY_SLOPE: f64 = 0.1;

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationKind::Relu => "relu",
            ActivationKind::LeakyRelu => "lrelu",
            ActivationKind::Elu => "elu",
            ActivationKind::Tanh => "tanh",
            ActivationKind::None => "none",
        }
    }

    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            ActivationKind::Relu => activation::relu(x),
            ActivationKind::LeakyRelu => activation::leaky_relu(x, Self::LEAKY_SLOPE),
            ActivationKind::Elu => {
                // elu(x) = max(x, 0) + exp(min(x, 0)) - 1
                let negative = x.clone().clamp_max(0.0).exp().sub_scalar(1.0);
                x.clamp_min(0.0) + negative
            }
            ActivationKind::Tanh => x.tanh(),
            ActivationKind::None => x,
        }
    }
}

impl FromStr for ActivationKind {
    type Err = BevError;

    fn from_str(s: &str) -> BevResult<Self> {
        match s {
            "relu" => Ok(ActivationKind::Relu),
            "lrelu" => Ok(ActivationKind::LeakyRelu),
            "elu" => Ok(ActivationKind::Elu),
            "tanh" => Ok(ActivationKind::Tanh),
            "none" => Ok(ActivationKind::None),
            other => Err(BevError::unknown_variant("activation", other, Self::EXPECTED)),
        }
    }
}

impl fmt::Display for ActivationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for [`ConvBlock`]
#[derive(Config, Debug, PartialEq)]
pub struct ConvBlockConfig {
    /// Input channels
    pub in_channels: usize,
    /// Output channels (defaults to `in_channels`)
    pub out_channels: Option<usize>,
    #[config(default = "3")]
    pub kernel_size: usize,
    #[config(default = "1")]
    pub stride: usize,
    /// Channel groups; must divide both channel counts
    #[config(default = "1")]
    pub groups: usize,
    #[config(default = "NormKind::BatchNorm")]
    pub norm: NormKind,
    #[config(default = "ActivationKind::Relu")]
    pub activation: ActivationKind,
    #[config(default = "false")]
    pub bias: bool,
    /// Use a transposed convolution with one row/column of output padding
    #[config(default = "false")]
    pub transpose: bool,
}

impl ConvBlockConfig {
    /// Resolved output channel count.
    pub fn out_channels(&self) -> usize {
        self.out_channels.unwrap_or(self.in_channels)
    }

    pub fn validate(&self) -> BevResult<()> {
        if self.in_channels == 0 || self.out_channels() == 0 {
            return Err(BevError::invalid_configuration(format!(
                "conv block channels must be positive, got {} -> {}",
                self.in_channels,
                self.out_channels()
            )));
        }
        if self.kernel_size == 0 || self.stride == 0 {
            return Err(BevError::invalid_configuration(format!(
                "kernel size ({}) and stride ({}) must be positive",
                self.kernel_size, self.stride
            )));
        }
        if self.groups == 0
            || self.in_channels % self.groups != 0
            || self.out_channels() % self.groups != 0
        {
            return Err(BevError::invalid_configuration(format!(
                "groups ({}) must divide {} -> {} channels",
                self.groups,
                self.in_channels,
                self.out_channels()
            )));
        }
        // Output padding has to stay below the stride
        if self.transpose && self.stride < 2 {
            return Err(BevError::invalid_configuration(
                "transposed conv block needs a stride of at least 2",
            ));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BevResult<ConvBlock<B>> {
        self.validate()?;

        let out_channels = self.out_channels();
        let k = self.kernel_size;
        let padding = (k - 1) / 2;

        let (conv, conv_transpose) = if self.transpose {
            let conv = ConvTranspose2dConfig::new([self.in_channels, out_channels], [k, k])
                .with_stride([self.stride, self.stride])
                .with_padding([padding, padding])
                .with_padding_out([1, 1])
                .with_groups(self.groups)
                .with_bias(self.bias)
                .init(device);
            (None, Some(conv))
        } else {
            let conv = Conv2dConfig::new([self.in_channels, out_channels], [k, k])
                .with_stride([self.stride, self.stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .with_groups(self.groups)
                .with_bias(self.bias)
                .init(device);
            (Some(conv), None)
        };

        let (batch_norm, instance_norm) = match self.norm {
            NormKind::BatchNorm => (Some(BatchNormConfig::new(out_channels).init(device)), None),
            NormKind::InstanceNorm => (None, Some(InstanceNormConfig::new(out_channels).init(device))),
            NormKind::None => (None, None),
        };

        Ok(ConvBlock {
            conv,
            conv_transpose,
            batch_norm,
            instance_norm,
            norm: Ignored(self.norm),
            activation: Ignored(self.activation),
            out_channels,
        })
    }
}

/// 2D convolution followed by optional normalization and activation.
///
/// Exactly one of `conv` / `conv_transpose` is present, and at most one
/// normalization, as chosen by [`ConvBlockConfig::init`].
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    conv: Option<Conv2d<B>>,
    conv_transpose: Option<ConvTranspose2d<B>>,
    batch_norm: Option<BatchNorm<B, 2>>,
    instance_norm: Option<InstanceNorm<B>>,
    norm: Ignored<NormKind>,
    activation: Ignored<ActivationKind>,
    out_channels: usize,
}

impl<B: Backend> ConvBlock<B> {
    /// Forward pass `[B, C_in, H, W] -> [B, C_out, H', W']`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = match (&self.conv, &self.conv_transpose) {
            (Some(conv), _) => conv.forward(x),
            (None, Some(conv)) => conv.forward(x),
            (None, None) => x,
        };

        let x = match (&self.batch_norm, &self.instance_norm) {
            (Some(norm), _) => norm.forward(x),
            (None, Some(norm)) => norm.forward(x),
            (None, None) => x,
        };

        self.activation.apply(x)
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn norm(&self) -> NormKind {
        *self.norm
    }

    pub fn activation(&self) -> ActivationKind {
        *self.activation
    }

    pub fn is_transposed(&self) -> bool {
        self.conv_transpose.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::{Distribution, TensorData};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_selector_parsing() {
        assert_eq!("bn".parse::<NormKind>().unwrap(), NormKind::BatchNorm);
        assert_eq!("in".parse::<NormKind>().unwrap(), NormKind::InstanceNorm);
        assert_eq!("none".parse::<NormKind>().unwrap(), NormKind::None);
        assert_eq!("lrelu".parse::<ActivationKind>().unwrap(), ActivationKind::LeakyRelu);
        assert_eq!("tanh".parse::<ActivationKind>().unwrap(), ActivationKind::Tanh);

        let err = "gn".parse::<NormKind>().unwrap_err();
        assert!(matches!(err, BevError::UnknownVariant { kind: "norm", .. }));
        let err = "gelu".parse::<ActivationKind>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_selector_display_matches_parse() {
        for norm in [NormKind::BatchNorm, NormKind::InstanceNorm, NormKind::None] {
            assert_eq!(norm.to_string().parse::<NormKind>().unwrap(), norm);
        }
        for act in [
            ActivationKind::Relu,
            ActivationKind::LeakyRelu,
            ActivationKind::Elu,
            ActivationKind::Tanh,
            ActivationKind::None,
        ] {
            assert_eq!(act.to_string().parse::<ActivationKind>().unwrap(), act);
        }
    }

    #[test]
    fn test_activation_values() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_data(TensorData::new(vec![-2.0f32, 0.0, 3.0], [3]), &device);

        let check = |kind: ActivationKind, expected: [f32; 3]| {
            let values = kind.apply(x.clone()).into_data().to_vec::<f32>().unwrap();
            for (v, e) in values.iter().zip(expected) {
                assert!((v - e).abs() < 1e-5, "{kind}: got {v}, expected {e}");
            }
        };

        check(ActivationKind::Relu, [0.0, 0.0, 3.0]);
        check(ActivationKind::LeakyRelu, [-0.2, 0.0, 3.0]);
        check(ActivationKind::Elu, [(-2.0f32).exp() - 1.0, 0.0, 3.0]);
        check(ActivationKind::Tanh, [(-2.0f32).tanh(), 0.0, 3.0f32.tanh()]);
        check(ActivationKind::None, [-2.0, 0.0, 3.0]);
    }

    #[test]
    fn test_conv_block_preserves_size() {
        let device = Default::default();
        let block = ConvBlockConfig::new(8)
            .with_out_channels(Some(16))
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 4>::random([2, 8, 9, 11], Distribution::Normal(0.0, 1.0), &device);
        let y = block.forward(x);
        assert_eq!(y.dims(), [2, 16, 9, 11]);
        assert_eq!(block.out_channels(), 16);
        assert!(!block.is_transposed());
    }

    #[test]
    fn test_conv_block_default_out_channels() {
        let device = Default::default();
        let block = ConvBlockConfig::new(4)
            .with_kernel_size(1)
            .init::<TestBackend>(&device)
            .unwrap();

        let y = block.forward(Tensor::zeros([1, 4, 5, 5], &device));
        assert_eq!(y.dims(), [1, 4, 5, 5]);
    }

    #[test]
    fn test_strided_and_transposed() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::random([1, 4, 8, 6], Distribution::Normal(0.0, 1.0), &device);

        let down = ConvBlockConfig::new(4)
            .with_stride(2)
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(down.forward(x.clone()).dims(), [1, 4, 4, 3]);

        let up = ConvBlockConfig::new(4)
            .with_stride(2)
            .with_transpose(true)
            .init::<TestBackend>(&device)
            .unwrap();
        assert!(up.is_transposed());
        assert_eq!(up.forward(x).dims(), [1, 4, 16, 12]);
    }

    #[test]
    fn test_instance_norm_and_relu_output() {
        let device = Default::default();
        let block = ConvBlockConfig::new(3)
            .with_norm(NormKind::InstanceNorm)
            .with_activation(ActivationKind::Relu)
            .init::<TestBackend>(&device)
            .unwrap();
        assert_eq!(block.norm(), NormKind::InstanceNorm);

        let x = Tensor::<TestBackend, 4>::random([2, 3, 6, 6], Distribution::Normal(0.0, 1.0), &device);
        let y = block.forward(x);
        let min: f32 = y.min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn test_invalid_configurations() {
        let device = Default::default();

        let err = ConvBlockConfig::new(0).init::<TestBackend>(&device).unwrap_err();
        assert!(err.is_configuration());

        let err = ConvBlockConfig::new(4)
            .with_transpose(true)
            .init::<TestBackend>(&device)
            .unwrap_err();
        assert!(matches!(err, BevError::InvalidConfiguration(_)));

        let err = ConvBlockConfig::new(6)
            .with_out_channels(Some(4))
            .with_groups(3)
            .init::<TestBackend>(&device)
            .unwrap_err();
        assert!(matches!(err, BevError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_grouped_conv_block() {
        let device = Default::default();
        let block = ConvBlockConfig::new(6)
            .with_out_channels(Some(9))
            .with_groups(3)
            .init::<TestBackend>(&device)
            .unwrap();

        let x = Tensor::<TestBackend, 4>::random([1, 6, 5, 5], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [1, 9, 5, 5]);
    }

    #[test]
    fn test_selectors_in_config_json() {
        let config = ConvBlockConfig::new(4)
            .with_norm(NormKind::None)
            .with_activation(ActivationKind::Elu);
        let json = config.to_string();
        assert!(json.contains("\"none\""));
        assert!(json.contains("\"elu\""));

        let restored = ConvBlockConfig::load_binary(json.as_bytes()).unwrap();
        assert_eq!(restored, config);

        let bad = json.replace("\"elu\"", "\"swish\"");
        assert!(ConvBlockConfig::load_binary(bad.as_bytes()).is_err());
    }
}
