pub mod error;
pub mod grid;
pub mod shape;
pub mod warp;

pub use error::{BevError, Result};
pub use grid::{BevGridConfig, GridBound};
pub use warp::{FeatureWarper, WarpMode};
