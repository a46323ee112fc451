//! Bottleneck - residual block with a narrowed middle.
//!
//! # Architecture
//!
//! ```text
//! Input [B, C_in, H, W]
//!   │
//!   ├──► 1x1 ConvBlock (C_in -> C_in/2)
//!   │      │
//!   │      ▼
//!   │    kxk ConvBlock (plain | stride 2 | transposed stride 2)
//!   │      │
//!   │      ▼
//!   │    1x1 ConvBlock (C_in/2 -> C_out)
//!   │      │
//!   │      ▼
//!   │    Channel dropout
//!   │      │
//!   └──► shortcut ──► (+) ──► Output [B, C_out, H', W']
//! ```
//!
//! The shortcut is the identity when channels and resolution are unchanged,
//! otherwise {nearest x2 upsample | 2x2 max-pool} → 1x1 conv → BatchNorm.

use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::*;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use serde::{Deserialize, Serialize};

use bevcast_core::error::{BevError, Result as BevResult};
use bevcast_core::shape::validate_map_channels;

use super::conv_block::{ConvBlock, ConvBlockConfig};
use super::dropout::ChannelDropout;

/// Spatial resampling performed by a bottleneck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resample {
    #[default]
    None,
    /// Double H and W
    Upsample,
    /// Halve H and W (rounding up)
    Downsample,
}

/// Configuration for [`Bottleneck`]
#[derive(Config, Debug, PartialEq)]
pub struct BottleneckConfig {
    pub in_channels: usize,
    /// Output channels (defaults to `in_channels`)
    pub out_channels: Option<usize>,
    /// Kernel of the middle convolution (odd)
    #[config(default = "3")]
    pub kernel_size: usize,
    /// Channel groups of the middle convolution
    #[config(default = "1")]
    pub groups: usize,
    #[config(default = "false")]
    pub upsample: bool,
    #[config(default = "false")]
    pub downsample: bool,
    /// Channel dropout probability in `[0, 1)`
    #[config(default = "0.0")]
    pub dropout: f64,
}

impl BottleneckConfig {
    pub fn out_channels(&self) -> usize {
        self.out_channels.unwrap_or(self.in_channels)
    }

    /// Resampling mode; requesting both directions is rejected.
    pub fn resample(&self) -> BevResult<Resample> {
        match (self.upsample, self.downsample) {
            (true, true) => Err(BevError::invalid_configuration(
                "downsample and upsample not possible simultaneously",
            )),
            (true, false) => Ok(Resample::Upsample),
            (false, true) => Ok(Resample::Downsample),
            (false, false) => Ok(Resample::None),
        }
    }

    pub fn validate(&self) -> BevResult<()> {
        self.resample()?;
        if self.in_channels < 2 {
            return Err(BevError::invalid_configuration(format!(
                "bottleneck needs at least 2 input channels, got {}",
                self.in_channels
            )));
        }
        if self.out_channels() == 0 {
            return Err(BevError::invalid_configuration(
                "bottleneck output channels must be positive",
            ));
        }
        if self.kernel_size % 2 == 0 {
            return Err(BevError::invalid_configuration(format!(
                "bottleneck kernel size must be odd, got {}",
                self.kernel_size
            )));
        }
        if self.groups == 0 || (self.in_channels / 2) % self.groups != 0 {
            return Err(BevError::invalid_configuration(format!(
                "groups ({}) must divide the {} bottleneck channels",
                self.groups,
                self.in_channels / 2
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(BevError::invalid_configuration(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BevResult<Bottleneck<B>> {
        self.validate()?;

        let resample = self.resample()?;
        let in_channels = self.in_channels;
        let out_channels = self.out_channels();
        let bottleneck_channels = in_channels / 2;

        // First projection with 1x1 kernel
        let reduce = ConvBlockConfig::new(in_channels)
            .with_out_channels(Some(bottleneck_channels))
            .with_kernel_size(1)
            .init(device)?;

        // Spatial transform
        let spatial = ConvBlockConfig::new(bottleneck_channels)
            .with_kernel_size(self.kernel_size)
            .with_groups(self.groups)
            .with_stride(if resample == Resample::None { 1 } else { 2 })
            .with_transpose(resample == Resample::Upsample)
            .init(device)?;

        // Final projection with 1x1 kernel
        let expand = ConvBlockConfig::new(bottleneck_channels)
            .with_out_channels(Some(out_channels))
            .with_kernel_size(1)
            .init(device)?;

        let projection = if out_channels == in_channels && resample == Resample::None {
            None
        } else {
            Some(Projection::new(in_channels, out_channels, resample, device))
        };

        Ok(Bottleneck {
            reduce,
            spatial,
            expand,
            dropout: ChannelDropout::new(self.dropout),
            projection,
            resample: Ignored(resample),
            in_channels,
            out_channels,
        })
    }
}

/// Shortcut path used when the residual changes channels or resolution.
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    pool: Option<MaxPool2d>,
    upsample: bool,
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
}

impl<B: Backend> Projection<B> {
    fn new(in_channels: usize, out_channels: usize, resample: Resample, device: &B::Device) -> Self {
        let pool = (resample == Resample::Downsample)
            .then(|| MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init());

        Self {
            pool,
            upsample: resample == Resample::Upsample,
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = if self.upsample {
            let [_, _, h, w] = x.dims();
            interpolate(x, [h * 2, w * 2], InterpolateOptions::new(InterpolateMode::Nearest))
        } else if let Some(pool) = &self.pool {
            pool.forward(x)
        } else {
            x
        };

        self.norm.forward(self.conv.forward(x))
    }
}

/// Residual bottleneck block.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub reduce: ConvBlock<B>,
    pub spatial: ConvBlock<B>,
    pub expand: ConvBlock<B>,
    dropout: ChannelDropout,
    pub projection: Option<Projection<B>>,
    resample: Ignored<Resample>,
    in_channels: usize,
    out_channels: usize,
}

impl<B: Backend> Bottleneck<B> {
    /// Forward pass `[B, C_in, H, W] -> [B, C_out, H', W']`.
    pub fn forward(&self, x: Tensor<B, 4>) -> BevResult<Tensor<B, 4>> {
        validate_map_channels(&x, self.in_channels)?;

        let residual = self.reduce.forward(x.clone());
        let residual = self.spatial.forward(residual);
        let residual = self.expand.forward(residual);
        let residual = self.dropout.forward(residual);

        let shortcut = match &self.projection {
            None => x,
            Some(projection) => {
                let x = if *self.resample == Resample::Downsample {
                    pad_to_even(x)
                } else {
                    x
                };
                projection.forward(x)
            }
        };

        Ok(residual + shortcut)
    }

    pub fn resample(&self) -> Resample {
        *self.resample
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn has_projection(&self) -> bool {
        self.projection.is_some()
    }
}

/// Zero-pad odd H/W by one trailing row/column.
///
/// The strided residual conv rounds odd sizes up, while 2x2 pooling rounds
/// down; padding first makes both paths land on `ceil(H/2) x ceil(W/2)`.
fn pad_to_even<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, h, w] = x.dims();
    if h % 2 == 0 && w % 2 == 0 {
        return x;
    }
    x.pad((0, w % 2, 0, h % 2), 0.0)
}
