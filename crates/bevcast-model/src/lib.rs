//! Neural modules of the BEV future-prediction engine.
//!
//! [`blocks`] holds the convolutional primitives, [`temporal`] the recurrent
//! prediction stack built from them. All modules are generic over a burn
//! [`Backend`](burn::tensor::backend::Backend).

pub mod blocks;
pub mod temporal;

pub use blocks::{
    ActivationKind, Bottleneck, BottleneckConfig, ChannelDropout, ConvBlock, ConvBlockConfig,
    NormKind, Resample,
};
pub use temporal::{FuturePrediction, FuturePredictionConfig, SpatialGru, SpatialGruConfig};
