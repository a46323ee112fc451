use burn::prelude::*;
use burn::tensor::Distribution;

/// Channel dropout for `[B, C, H, W]` feature maps.
///
/// Zeroes whole channels with probability `prob` and rescales the survivors.
/// Only active on autodiff backends; inference backends pass the input through
/// untouched, so forward calls stay deterministic.
#[derive(Module, Clone, Debug)]
pub struct ChannelDropout {
    pub prob: f64,
}

impl ChannelDropout {
    pub fn new(prob: f64) -> Self {
        Self { prob }
    }

    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        if !B::ad_enabled() || self.prob == 0.0 {
            return input;
        }

        let [batch, channels, _, _] = input.dims();
        let keep = 1.0 - self.prob;
        let mask = Tensor::<B, 4>::random(
            [batch, channels, 1, 1],
            Distribution::Bernoulli(keep),
            &input.device(),
        );

        input * mask.div_scalar(keep)
    }
}
