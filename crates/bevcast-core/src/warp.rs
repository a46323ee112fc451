//! Motion-compensated warping of BEV feature maps.
//!
//! A motion field `[B, 2, H, W]` holds, for every output cell, the
//! displacement (in grid cells) of the location to read from:
//!
//! ```text
//! output[b, c, y, x] = input[b, c, y + flow[b, 1, y, x], x + flow[b, 0, y, x]]
//! ```
//!
//! Channel 0 is the displacement along the width axis, channel 1 along the
//! height axis. Locations outside the grid read as zero.

use std::fmt;
use std::str::FromStr;

use burn::tensor::{backend::Backend, Int, Tensor};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BevError, Result};
use crate::shape::validate_motion_map;

/// Interpolation used when reading warped features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarpMode {
    /// Bilinear blend of the four neighbouring cells
    #[default]
    Bilinear,
    /// Nearest cell
    Nearest,
}

impl WarpMode {
    const EXPECTED: &'static str = "bilinear, nearest";

    pub fn as_str(&self) -> &'static str {
        match self {
            WarpMode::Bilinear => "bilinear",
            WarpMode::Nearest => "nearest",
        }
    }
}

impl FromStr for WarpMode {
    type Err = BevError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bilinear" => Ok(WarpMode::Bilinear),
            "nearest" => Ok(WarpMode::Nearest),
            other => Err(BevError::unknown_variant("warp mode", other, Self::EXPECTED)),
        }
    }
}

impl fmt::Display for WarpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dense 2D feature warper.
///
/// Holds no tensors, so one warper can be shared by any number of modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeatureWarper {
    mode: WarpMode,
}

impl FeatureWarper {
    pub fn new(mode: WarpMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> WarpMode {
        self.mode
    }

    /// Warp `features` `[B, C, H, W]` by `flow` `[B, 2, H, W]`.
    pub fn warp<B: Backend>(&self, features: Tensor<B, 4>, flow: Tensor<B, 4>) -> Result<Tensor<B, 4>> {
        validate_motion_map(&features, &flow)?;
        debug!("Warping {:?} features ({})", features.dims(), self.mode);

        let (px, py) = sampling_positions(flow);
        let warped = match self.mode {
            WarpMode::Bilinear => sample_bilinear(&features, px, py),
            WarpMode::Nearest => sample_nearest(&features, px, py),
        };
        Ok(warped)
    }
}

/// Absolute sampling positions `(x, y)`, each `[B, 1, H, W]`, in cell units.
fn sampling_positions<B: Backend>(flow: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
    let [b, _, h, w] = flow.dims();
    let device = flow.device();

    // Broadcastable coordinate rows
    let x_range = Tensor::<B, 1, Int>::arange(0..w as i64, &device)
        .float()
        .reshape([1, 1, 1, w]);
    let y_range = Tensor::<B, 1, Int>::arange(0..h as i64, &device)
        .float()
        .reshape([1, 1, h, 1]);

    let flow_x = flow.clone().slice([0..b, 0..1, 0..h, 0..w]);
    let flow_y = flow.slice([0..b, 1..2, 0..h, 0..w]);

    (flow_x + x_range, flow_y + y_range)
}

fn sample_bilinear<B: Backend>(
    input: &Tensor<B, 4>,
    px: Tensor<B, 4>,
    py: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let x0 = px.clone().floor();
    let y0 = py.clone().floor();
    let x1 = x0.clone().add_scalar(1.0);
    let y1 = y0.clone().add_scalar(1.0);

    let wx1 = px - x0.clone();
    let wy1 = py - y0.clone();
    let wx0 = wx1.clone().neg().add_scalar(1.0);
    let wy0 = wy1.clone().neg().add_scalar(1.0);

    let v00 = gather_cell(input, x0.clone(), y0.clone(), wx0.clone() * wy0.clone());
    let v01 = gather_cell(input, x1.clone(), y0, wx1.clone() * wy0);
    let v10 = gather_cell(input, x0, y1.clone(), wx0 * wy1.clone());
    let v11 = gather_cell(input, x1, y1, wx1 * wy1);

    v00 + v01 + v10 + v11
}

fn sample_nearest<B: Backend>(
    input: &Tensor<B, 4>,
    px: Tensor<B, 4>,
    py: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let weight = px.ones_like();
    gather_cell(input, px.round(), py.round(), weight)
}

/// Read `input` at integer cell positions `(xi, yi)` and scale by `weight`.
///
/// Out-of-grid positions contribute zero.
fn gather_cell<B: Backend>(
    input: &Tensor<B, 4>,
    xi: Tensor<B, 4>,
    yi: Tensor<B, 4>,
    weight: Tensor<B, 4>,
) -> Tensor<B, 4> {
    let [b, c, h, w] = input.dims();
    let max_x = (w - 1) as f32;
    let max_y = (h - 1) as f32;

    let valid = xi.clone().greater_equal_elem(0.0).int()
        * xi.clone().lower_equal_elem(max_x).int()
        * yi.clone().greater_equal_elem(0.0).int()
        * yi.clone().lower_equal_elem(max_y).int();

    // Clamp before casting so masked positions still index safely
    let xi = xi.clamp(0.0, max_x).int();
    let yi = yi.clamp(0.0, max_y).int();

    let idx = yi.mul_scalar(w as i32) + xi;
    let idx = idx.reshape([b, 1, h * w]).repeat(&[1, c, 1]);

    let gathered = input
        .clone()
        .reshape([b, c, h * w])
        .gather(2, idx)
        .reshape([b, c, h, w]);

    gathered * (weight * valid.float())
}
