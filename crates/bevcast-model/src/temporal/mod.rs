//! Temporal modelling over BEV feature sequences.
//!
//! ```text
//! temporal/
//! ├── spatial_gru/        - convolutional GRU with optional motion warping
//! └── future_prediction/  - stacked GRU stages with bottleneck refinement
//! ```

pub mod future_prediction;
pub mod spatial_gru;

pub use future_prediction::{presets, FuturePrediction, FuturePredictionConfig, PredictionStage};
pub use spatial_gru::{SpatialGru, SpatialGruConfig};
