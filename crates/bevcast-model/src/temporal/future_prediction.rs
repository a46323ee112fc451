//! FuturePrediction - stacked SpatialGRU stages with bottleneck refinement.
//!
//! # Architecture
//!
//! ```text
//! Latent sequence [B, T, latent_dim, H, W]      Current state [B, in_channels, H, W]
//!   │                                                 │
//!   ▼                                                 │
//! Stage 0: SpatialGRU(latent_dim -> in_channels) ◄────┤
//!   │      fold T into B ─► n_res_layers × Bottleneck ─► unfold
//!   ▼                                                 │
//! Stage 1: SpatialGRU(in_channels -> in_channels) ◄───┤
//!   │      ...                                        │
//!   ▼                                                 │
//! Stage n-1 ◄─────────────────────────────────────────┘
//!   │
//!   ▼
//! Predicted sequence [B, T, in_channels, H, W]
//! ```
//!
//! Every stage is seeded with the same current state, not with the final
//! state of the previous stage.

use burn::prelude::*;
use tracing::{debug, info};

use bevcast_core::error::{BevError, Result as BevResult};
use bevcast_core::shape::{fold_time, unfold_time, validate_sequence_channels};
use bevcast_core::warp::WarpMode;

use super::spatial_gru::{SpatialGru, SpatialGruConfig};
use crate::blocks::{ActivationKind, Bottleneck, BottleneckConfig, NormKind};

/// Configuration for [`FuturePrediction`]
#[derive(Config, Debug, PartialEq)]
pub struct FuturePredictionConfig {
    /// Channels of the current state and of the predicted sequence
    pub in_channels: usize,
    /// Channels of the latent input sequence
    pub latent_dim: usize,
    /// Number of GRU stages
    #[config(default = "3")]
    pub n_gru_blocks: usize,
    /// Bottlenecks applied after each GRU
    #[config(default = "3")]
    pub n_res_layers: usize,
    /// Gate bias offset of every GRU
    #[config(default = "0.0")]
    pub gru_bias_init: f64,
    #[config(default = "NormKind::BatchNorm")]
    pub norm: NormKind,
    #[config(default = "ActivationKind::Relu")]
    pub activation: ActivationKind,
    /// Channel dropout inside the bottlenecks
    #[config(default = "0.0")]
    pub dropout: f64,
    #[config(default = "WarpMode::Bilinear")]
    pub warp_mode: WarpMode,
}

impl FuturePredictionConfig {
    pub fn validate(&self) -> BevResult<()> {
        if self.in_channels < 2 {
            return Err(BevError::invalid_configuration(format!(
                "in_channels must be at least 2, got {}",
                self.in_channels
            )));
        }
        if self.latent_dim == 0 {
            return Err(BevError::invalid_configuration("latent_dim must be positive"));
        }
        if self.n_gru_blocks == 0 {
            return Err(BevError::invalid_configuration(
                "at least one GRU block is required",
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(BevError::invalid_configuration(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BevResult<FuturePrediction<B>> {
        self.validate()?;

        let stages = (0..self.n_gru_blocks)
            .map(|i| {
                let gru_in = if i == 0 { self.latent_dim } else { self.in_channels };
                self.init_stage(gru_in, device)
            })
            .collect::<BevResult<Vec<_>>>()?;

        info!(
            "FuturePrediction: {} stages x {} bottlenecks, latent {} -> {} channels",
            self.n_gru_blocks, self.n_res_layers, self.latent_dim, self.in_channels
        );

        Ok(FuturePrediction {
            stages,
            in_channels: self.in_channels,
            latent_dim: self.latent_dim,
        })
    }

    fn init_stage<B: Backend>(&self, gru_in: usize, device: &B::Device) -> BevResult<PredictionStage<B>> {
        let gru = SpatialGruConfig::new(gru_in, self.in_channels)
            .with_gru_bias_init(self.gru_bias_init)
            .with_norm(self.norm)
            .with_activation(self.activation)
            .with_warp_mode(self.warp_mode)
            .init(device)?;

        let refinement = (0..self.n_res_layers)
            .map(|_| {
                BottleneckConfig::new(self.in_channels)
                    .with_dropout(self.dropout)
                    .init(device)
            })
            .collect::<BevResult<Vec<_>>>()?;

        Ok(PredictionStage { gru, refinement })
    }
}

/// One GRU followed by its channel-preserving bottlenecks.
#[derive(Module, Debug)]
pub struct PredictionStage<B: Backend> {
    pub gru: SpatialGru<B>,
    pub refinement: Vec<Bottleneck<B>>,
}

impl<B: Backend> PredictionStage<B> {
    pub fn forward(
        &self,
        x: Tensor<B, 5>,
        hidden_state: Tensor<B, 4>,
        flow: Option<Tensor<B, 5>>,
    ) -> BevResult<Tensor<B, 5>> {
        let x = self.gru.forward(x, Some(hidden_state), flow)?;

        let [batch, timesteps, _, _, _] = x.dims();
        let mut x = fold_time(x);
        for bottleneck in &self.refinement {
            x = bottleneck.forward(x)?;
        }
        Ok(unfold_time(x, batch, timesteps))
    }
}

/// Future prediction engine.
#[derive(Module, Debug)]
pub struct FuturePrediction<B: Backend> {
    pub stages: Vec<PredictionStage<B>>,
    in_channels: usize,
    latent_dim: usize,
}

impl<B: Backend> FuturePrediction<B> {
    /// Predict future BEV states.
    ///
    /// # Arguments
    /// * `x` - Latent sequence [batch, T, latent_dim, H, W]
    /// * `hidden_state` - Current state [batch, in_channels, H, W]
    ///
    /// # Returns
    /// * Predicted sequence [batch, T, in_channels, H, W]
    pub fn forward(&self, x: Tensor<B, 5>, hidden_state: Tensor<B, 4>) -> BevResult<Tensor<B, 5>> {
        self.forward_with_motion(x, hidden_state, None)
    }

    /// Same as [`forward`](Self::forward), warping each GRU state by `flow`
    /// [batch, T, 2, H, W] before every step.
    pub fn forward_with_motion(
        &self,
        x: Tensor<B, 5>,
        hidden_state: Tensor<B, 4>,
        flow: Option<Tensor<B, 5>>,
    ) -> BevResult<Tensor<B, 5>> {
        validate_sequence_channels(&x, self.latent_dim)?;

        let mut x = x;
        for (i, stage) in self.stages.iter().enumerate() {
            x = stage.forward(x, hidden_state.clone(), flow.clone())?;
            debug!("Stage {}: output {:?}", i, x.dims());
        }
        Ok(x)
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }
}

/// Preset configurations.
pub mod presets {
    use super::*;

    /// 64-channel state and latent, three stages of three bottlenecks.
    pub fn reference() -> FuturePredictionConfig {
        FuturePredictionConfig::new(64, 64)
    }

    /// Narrow single-stage variant for quick experiments.
    pub fn lightweight() -> FuturePredictionConfig {
        FuturePredictionConfig::new(16, 16)
            .with_n_gru_blocks(1)
            .with_n_res_layers(1)
    }

    pub const NAMES: [&str; 2] = ["reference", "lightweight"];

    pub fn by_name(name: &str) -> BevResult<FuturePredictionConfig> {
        match name {
            "reference" => Ok(reference()),
            "lightweight" => Ok(lightweight()),
            other => Err(BevError::unknown_variant(
                "prediction preset",
                other,
                "reference, lightweight",
            )),
        }
    }
}
