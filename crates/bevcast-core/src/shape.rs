//! Shape validation for feature maps, sequences and motion fields.
//!
//! Axis counts are fixed by the tensor rank in the type system; these checks
//! cover the remaining runtime preconditions (channel widths, batch and
//! spatial agreement between tensors that are combined).

use burn::tensor::{backend::Backend, Tensor};

use crate::error::{BevError, Result};

/// Number of channels in a motion field (x and y displacement).
pub const MOTION_CHANNELS: usize = 2;

/// Check that a feature sequence `[B, T, C, H, W]` has `expected` channels.
pub fn validate_sequence_channels<B: Backend>(
    sequence: &Tensor<B, 5>,
    expected: usize,
) -> Result<()> {
    let [_, _, channels, _, _] = sequence.dims();
    if channels != expected {
        return Err(BevError::dimension_mismatch(format!(
            "feature sizes must match, got input {} for layer with size {}",
            channels, expected
        )));
    }
    Ok(())
}

/// Check that a feature map `[B, C, H, W]` has `expected` channels.
pub fn validate_map_channels<B: Backend>(map: &Tensor<B, 4>, expected: usize) -> Result<()> {
    let [_, channels, _, _] = map.dims();
    if channels != expected {
        return Err(BevError::dimension_mismatch(format!(
            "feature map has {} channels, expected {}",
            channels, expected
        )));
    }
    Ok(())
}

/// Check that a sequence holds at least one time step and a non-empty grid.
pub fn validate_nonempty_sequence<B: Backend>(sequence: &Tensor<B, 5>) -> Result<()> {
    let [_, timesteps, _, height, width] = sequence.dims();
    if timesteps == 0 {
        return Err(BevError::dimension_mismatch(
            "sequence must contain at least one time step",
        ));
    }
    validate_spatial_extent(height, width)
}

/// Check that a grid has at least one row and one column.
pub fn validate_spatial_extent(height: usize, width: usize) -> Result<()> {
    if height == 0 || width == 0 {
        return Err(BevError::dimension_mismatch(format!(
            "spatial extent must be non-empty, got {}x{}",
            height, width
        )));
    }
    Ok(())
}

/// Check that a state map `[B, C, H, W]` lines up with a sequence
/// `[B, T, _, H, W]` and carries `channels` channels.
pub fn validate_state<B: Backend>(
    sequence: &Tensor<B, 5>,
    state: &Tensor<B, 4>,
    channels: usize,
) -> Result<()> {
    let [batch, _, _, height, width] = sequence.dims();
    let actual = state.dims();
    let expected = [batch, channels, height, width];
    if actual != expected {
        return Err(BevError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// Check that a motion field `[B, T, 2, H, W]` lines up with a sequence.
pub fn validate_motion_sequence<B: Backend>(
    sequence: &Tensor<B, 5>,
    flow: &Tensor<B, 5>,
) -> Result<()> {
    let [batch, timesteps, _, height, width] = sequence.dims();
    let actual = flow.dims();
    let expected = [batch, timesteps, MOTION_CHANNELS, height, width];
    if actual != expected {
        return Err(BevError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    Ok(())
}

/// Check that a single-step motion field `[B, 2, H, W]` lines up with a map.
pub fn validate_motion_map<B: Backend>(map: &Tensor<B, 4>, flow: &Tensor<B, 4>) -> Result<()> {
    let [batch, _, height, width] = map.dims();
    let actual = flow.dims();
    let expected = [batch, MOTION_CHANNELS, height, width];
    if actual != expected {
        return Err(BevError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        });
    }
    validate_spatial_extent(height, width)
}

/// Feature map at time step `t` of a sequence `[B, T, C, H, W]`.
pub fn time_step<B: Backend>(sequence: &Tensor<B, 5>, t: usize) -> Tensor<B, 4> {
    let [b, _, c, h, w] = sequence.dims();
    sequence
        .clone()
        .slice([0..b, t..t + 1, 0..c, 0..h, 0..w])
        .squeeze::<4>(1)
}

/// Merge the time axis into the batch axis: `[B, T, C, H, W] -> [B*T, C, H, W]`.
pub fn fold_time<B: Backend>(sequence: Tensor<B, 5>) -> Tensor<B, 4> {
    let [b, t, c, h, w] = sequence.dims();
    sequence.reshape([b * t, c, h, w])
}

/// Split a folded batch back out: `[B*T, C, H, W] -> [B, T, C, H, W]`.
pub fn unfold_time<B: Backend>(folded: Tensor<B, 4>, batch: usize, timesteps: usize) -> Tensor<B, 5> {
    let [_, c, h, w] = folded.dims();
    folded.reshape([batch, timesteps, c, h, w])
}
