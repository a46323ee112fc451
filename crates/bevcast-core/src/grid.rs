//! BEV grid geometry.
//!
//! A grid is described per axis by `[min, max, step]` in metres. The x axis
//! points forward, y left and z up; in the 2D feature map, width runs along x
//! and height along y. The depth bound describes the camera frustum bins used
//! by the lifting stage.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{BevError, Result as BevResult};

/// Extent and resolution along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBound {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl GridBound {
    pub const fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Build from the `[min, max, step]` triple used in grid tables.
    pub const fn from_array(bound: [f64; 3]) -> Self {
        Self::new(bound[0], bound[1], bound[2])
    }

    pub fn validate(&self) -> BevResult<()> {
        if !(self.step > 0.0) {
            return Err(BevError::invalid_configuration(format!(
                "grid step must be positive, got {}",
                self.step
            )));
        }
        if !(self.max > self.min) {
            return Err(BevError::invalid_configuration(format!(
                "grid max ({}) must exceed min ({})",
                self.max, self.min
            )));
        }
        Ok(())
    }

    /// Number of cells covering `[min, max)`.
    pub fn cells(&self) -> BevResult<usize> {
        self.validate()?;
        Ok(((self.max - self.min) / self.step).round() as usize)
    }

    /// Metric coordinate of the centre of cell `index`.
    pub fn cell_center(&self, index: usize) -> f64 {
        self.min + self.step / 2.0 + index as f64 * self.step
    }

    /// Cell containing the metric coordinate `coord`, if inside the bound.
    pub fn cell_of(&self, coord: f64) -> Option<usize> {
        if coord < self.min || coord >= self.max {
            return None;
        }
        Some(((coord - self.min) / self.step).floor() as usize)
    }
}

/// BEV grid configuration
#[derive(Config, Debug, PartialEq)]
pub struct BevGridConfig {
    /// Forward axis; maps to feature-map width
    pub xbound: GridBound,
    /// Left axis; maps to feature-map height
    pub ybound: GridBound,
    /// Vertical extent collapsed into the BEV plane
    pub zbound: Option<GridBound>,
    /// Camera depth bins
    pub dbound: Option<GridBound>,
}

impl BevGridConfig {
    /// Feature-map spatial shape `[height, width]`.
    pub fn spatial_shape(&self) -> BevResult<[usize; 2]> {
        Ok([self.ybound.cells()?, self.xbound.cells()?])
    }

    /// Number of vertical cells (1 when the grid is already planar).
    pub fn vertical_cells(&self) -> BevResult<usize> {
        self.zbound.as_ref().map_or(Ok(1), GridBound::cells)
    }

    /// Number of depth bins, if a depth bound is configured.
    pub fn depth_bins(&self) -> BevResult<Option<usize>> {
        self.dbound.as_ref().map(GridBound::cells).transpose()
    }

    /// Check every configured bound.
    pub fn validate(&self) -> BevResult<()> {
        self.xbound.validate()?;
        self.ybound.validate()?;
        if let Some(z) = &self.zbound {
            z.validate()?;
        }
        if let Some(d) = &self.dbound {
            d.validate()?;
        }
        Ok(())
    }
}

/// Grid presets for the perception tasks sharing the BEV feature map.
pub mod presets {
    use super::*;

    const Z: GridBound = GridBound::from_array([-10.0, 10.0, 20.0]);
    const DEPTH: GridBound = GridBound::from_array([1.0, 60.0, 1.0]);

    /// Base grid the camera features are lifted into (128 x 128 cells at 0.8 m).
    pub fn base() -> BevGridConfig {
        BevGridConfig::new(
            GridBound::from_array([-51.2, 51.2, 0.8]),
            GridBound::from_array([-51.2, 51.2, 0.8]),
        )
        .with_zbound(Some(Z))
        .with_dbound(Some(DEPTH))
    }

    /// Planar detection grid (200 x 200 cells at 0.5 m).
    pub fn detection() -> BevGridConfig {
        BevGridConfig::new(
            GridBound::from_array([-50.0, 50.0, 0.5]),
            GridBound::from_array([-50.0, 50.0, 0.5]),
        )
    }

    /// Motion / future-prediction grid (200 x 200 cells at 0.5 m).
    pub fn motion() -> BevGridConfig {
        detection().with_zbound(Some(Z)).with_dbound(Some(DEPTH))
    }

    /// Segmentation grid (200 rows x 400 columns at 0.15 m).
    pub fn segmentation() -> BevGridConfig {
        BevGridConfig::new(
            GridBound::from_array([-30.0, 30.0, 0.15]),
            GridBound::from_array([-15.0, 15.0, 0.15]),
        )
        .with_zbound(Some(Z))
        .with_dbound(Some(DEPTH))
    }

    /// Preset names accepted by [`by_name`].
    pub const NAMES: &[&str] = &["base", "det", "mot", "seg"];

    /// Look up a preset by its short name. `lifting` is accepted for `base`.
    pub fn by_name(name: &str) -> BevResult<BevGridConfig> {
        match name {
            "base" | "lifting" => Ok(base()),
            "det" => Ok(detection()),
            "mot" => Ok(motion()),
            "seg" => Ok(segmentation()),
            other => Err(BevError::unknown_variant(
                "grid preset",
                other,
                "base, det, mot, seg",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_shapes() {
        assert_eq!(presets::base().spatial_shape().unwrap(), [128, 128]);
        assert_eq!(presets::detection().spatial_shape().unwrap(), [200, 200]);
        assert_eq!(presets::motion().spatial_shape().unwrap(), [200, 200]);
        assert_eq!(presets::segmentation().spatial_shape().unwrap(), [200, 400]);
    }

    #[test]
    fn test_vertical_and_depth() {
        let base = presets::base();
        assert_eq!(base.vertical_cells().unwrap(), 1);
        assert_eq!(base.depth_bins().unwrap(), Some(59));

        let det = presets::detection();
        assert_eq!(det.vertical_cells().unwrap(), 1);
        assert_eq!(det.depth_bins().unwrap(), None);
    }

    #[test]
    fn test_cell_lookup() {
        let bound = GridBound::new(-50.0, 50.0, 0.5);
        assert_eq!(bound.cell_of(-50.0), Some(0));
        assert_eq!(bound.cell_of(0.1), Some(100));
        assert_eq!(bound.cell_of(50.0), None);
        assert!((bound.cell_center(0) + 49.75).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(GridBound::new(0.0, 10.0, 0.0).cells().is_err());
        assert!(GridBound::new(10.0, 0.0, 1.0).cells().is_err());

        let grid = BevGridConfig::new(
            GridBound::new(0.0, 10.0, 1.0),
            GridBound::new(0.0, 10.0, -1.0),
        );
        assert!(grid.validate().is_err());
    }

    #[test]
    fn test_config_json_round_trip() {
        let grid = presets::motion();
        let restored = BevGridConfig::load_binary(grid.to_string().as_bytes()).unwrap();
        assert_eq!(restored, grid);
        assert_eq!(restored.depth_bins().unwrap(), Some(59));
    }

    #[test]
    fn test_preset_lookup() {
        for name in presets::NAMES {
            assert!(presets::by_name(name).is_ok());
        }
        assert_eq!(presets::by_name("base").unwrap(), presets::base());
        assert_eq!(presets::by_name("lifting").unwrap(), presets::base());
        assert_eq!(presets::by_name("mot").unwrap(), presets::motion());
        assert!(presets::by_name("lidar").unwrap_err().is_configuration());
    }
}
