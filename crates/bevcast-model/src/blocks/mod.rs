//! Convolutional building blocks shared by the temporal engine.
//!
//! ```text
//! blocks/
//! ├── conv_block/   - conv + norm + activation primitive
//! ├── bottleneck/   - residual bottleneck with optional resampling
//! └── dropout/      - channel dropout regulariser
//! ```

pub mod bottleneck;
pub mod conv_block;
pub mod dropout;

pub use bottleneck::{Bottleneck, BottleneckConfig, Projection, Resample};
pub use conv_block::{ActivationKind, ConvBlock, ConvBlockConfig, NormKind};
pub use dropout::ChannelDropout;
