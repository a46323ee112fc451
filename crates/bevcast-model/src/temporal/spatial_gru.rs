//! SpatialGRU - convolutional gated recurrent unit over BEV feature sequences.
//!
//! Per time step `t`, with `x_t` the input slice and `h` the carried state:
//!
//! ```text
//! h      = warp(h, flow_t)                      (only if a motion field is given)
//! z      = sigmoid(conv_update([x_t, h]) + b)
//! r      = sigmoid(conv_reset([x_t, h]) + b)
//! h~     = ConvBlock([x_t, (1 - r) * h])
//! h      = (1 - z) * h + z * h~
//! ```
//!
//! `b` is the gate bias offset; large negative values drive both gates
//! towards zero so the cell starts close to the identity map.

use burn::module::Ignored;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;

use bevcast_core::error::{BevError, Result as BevResult};
use bevcast_core::shape::{
    time_step, validate_map_channels, validate_motion_sequence, validate_nonempty_sequence,
    validate_sequence_channels, validate_state,
};
use bevcast_core::warp::{FeatureWarper, WarpMode};

use crate::blocks::{ActivationKind, ConvBlock, ConvBlockConfig, NormKind};

/// Configuration for [`SpatialGru`]
#[derive(Config, Debug, PartialEq)]
pub struct SpatialGruConfig {
    /// Channels of each input slice
    pub input_size: usize,
    /// Channels of the hidden state
    pub hidden_size: usize,
    /// Offset added to both gate pre-activations
    #[config(default = "0.0")]
    pub gru_bias_init: f64,
    /// Normalization of the candidate state
    #[config(default = "NormKind::BatchNorm")]
    pub norm: NormKind,
    /// Activation of the candidate state
    #[config(default = "ActivationKind::Relu")]
    pub activation: ActivationKind,
    /// Interpolation used for motion compensation
    #[config(default = "WarpMode::Bilinear")]
    pub warp_mode: WarpMode,
}

impl SpatialGruConfig {
    pub fn validate(&self) -> BevResult<()> {
        if self.input_size == 0 || self.hidden_size == 0 {
            return Err(BevError::invalid_configuration(format!(
                "GRU sizes must be positive, got input {} hidden {}",
                self.input_size, self.hidden_size
            )));
        }
        if !self.gru_bias_init.is_finite() {
            return Err(BevError::invalid_configuration(format!(
                "gru_bias_init must be finite, got {}",
                self.gru_bias_init
            )));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BevResult<SpatialGru<B>> {
        self.validate()?;

        let concat_channels = self.input_size + self.hidden_size;
        let gate_conv = || {
            Conv2dConfig::new([concat_channels, self.hidden_size], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(true)
                .init(device)
        };

        let conv_state_tilde = ConvBlockConfig::new(concat_channels)
            .with_out_channels(Some(self.hidden_size))
            .with_kernel_size(3)
            .with_bias(false)
            .with_norm(self.norm)
            .with_activation(self.activation)
            .init(device)?;

        Ok(SpatialGru {
            conv_update: gate_conv(),
            conv_reset: gate_conv(),
            conv_state_tilde,
            input_size: self.input_size,
            hidden_size: self.hidden_size,
            gru_bias_init: Ignored(self.gru_bias_init),
            warper: Ignored(FeatureWarper::new(self.warp_mode)),
        })
    }
}

/// Convolutional GRU advancing a `[B, hidden, H, W]` state over time.
///
/// Holds no state between calls: every [`forward`](Self::forward) starts from
/// the supplied state (or zeros) and returns the state after each step.
#[derive(Module, Debug)]
pub struct SpatialGru<B: Backend> {
    pub conv_update: Conv2d<B>,
    pub conv_reset: Conv2d<B>,
    pub conv_state_tilde: ConvBlock<B>,
    input_size: usize,
    hidden_size: usize,
    gru_bias_init: Ignored<f64>,
    warper: Ignored<FeatureWarper>,
}

impl<B: Backend> SpatialGru<B> {
    /// Run the recurrence over a sequence.
    ///
    /// # Arguments
    /// * `x` - Input sequence [batch, T, input_size, H, W]
    /// * `state` - Initial hidden state [batch, hidden_size, H, W] (zeros if `None`)
    /// * `flow` - Optional motion field [batch, T, 2, H, W]
    ///
    /// # Returns
    /// * Hidden state after every step [batch, T, hidden_size, H, W]
    pub fn forward(
        &self,
        x: Tensor<B, 5>,
        state: Option<Tensor<B, 4>>,
        flow: Option<Tensor<B, 5>>,
    ) -> BevResult<Tensor<B, 5>> {
        validate_sequence_channels(&x, self.input_size)?;
        validate_nonempty_sequence(&x)?;
        if let Some(state) = &state {
            validate_state(&x, state, self.hidden_size)?;
        }
        if let Some(flow) = &flow {
            validate_motion_sequence(&x, flow)?;
        }

        let [batch, timesteps, _, height, width] = x.dims();
        let mut rnn_state = state
            .unwrap_or_else(|| Tensor::zeros([batch, self.hidden_size, height, width], &x.device()));

        let mut rnn_output = Vec::with_capacity(timesteps);
        for t in 0..timesteps {
            let x_t = time_step(&x, t);
            if let Some(flow) = &flow {
                rnn_state = self.warper.warp(rnn_state, time_step(flow, t))?;
            }

            rnn_state = self.cell(x_t, rnn_state);
            tracing::trace!(step = t, "spatial GRU step");
            rnn_output.push(rnn_state.clone());
        }

        Ok(Tensor::stack(rnn_output, 1))
    }

    /// Advance a single step: `x_t` [batch, input_size, H, W], `state`
    /// [batch, hidden_size, H, W].
    pub fn gru_cell(&self, x_t: Tensor<B, 4>, state: Tensor<B, 4>) -> BevResult<Tensor<B, 4>> {
        self.validate_step(&x_t, &state)?;
        Ok(self.cell(x_t, state))
    }

    /// Update and reset gates `(z, r)` for one step, each [batch, hidden_size, H, W].
    pub fn gates(&self, x_t: Tensor<B, 4>, state: Tensor<B, 4>) -> BevResult<(Tensor<B, 4>, Tensor<B, 4>)> {
        self.validate_step(&x_t, &state)?;
        Ok(self.compute_gates(Tensor::cat(vec![x_t, state], 1)))
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn gru_bias_init(&self) -> f64 {
        *self.gru_bias_init
    }

    pub fn warp_mode(&self) -> WarpMode {
        self.warper.mode()
    }

    fn validate_step(&self, x_t: &Tensor<B, 4>, state: &Tensor<B, 4>) -> BevResult<()> {
        validate_map_channels(x_t, self.input_size)?;
        validate_map_channels(state, self.hidden_size)?;

        let [xb, _, xh, xw] = x_t.dims();
        let [sb, _, sh, sw] = state.dims();
        if [xb, xh, xw] != [sb, sh, sw] {
            return Err(BevError::ShapeMismatch {
                expected: vec![xb, self.hidden_size, xh, xw],
                actual: state.dims().to_vec(),
            });
        }
        Ok(())
    }

    fn compute_gates(&self, x_and_state: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let bias = *self.gru_bias_init;
        let update_gate = sigmoid(self.conv_update.forward(x_and_state.clone()).add_scalar(bias));
        let reset_gate = sigmoid(self.conv_reset.forward(x_and_state).add_scalar(bias));
        (update_gate, reset_gate)
    }

    fn cell(&self, x: Tensor<B, 4>, state: Tensor<B, 4>) -> Tensor<B, 4> {
        let (update_gate, reset_gate) =
            self.compute_gates(Tensor::cat(vec![x.clone(), state.clone()], 1));

        let reset_state = reset_gate.neg().add_scalar(1.0) * state.clone();
        let state_tilde = self
            .conv_state_tilde
            .forward(Tensor::cat(vec![x, reset_state], 1));

        update_gate.clone().neg().add_scalar(1.0) * state + update_gate * state_tilde
    }
}
