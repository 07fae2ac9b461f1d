use super::CallbackHooks;
use crate::optim::clip_grad_norm;
use crate::train::RunContext;
use crate::{Error, Result, Tensor};

/// Rescale gradients so their global L2 norm is at most `max_norm`
#[derive(Debug, Clone)]
pub struct GradientClipping {
    max_norm: f32,
    last_norm: Option<f32>,
    clipped_steps: usize,
}

impl GradientClipping {
    pub fn new(max_norm: f32) -> Self {
        Self {
            max_norm,
            last_norm: None,
            clipped_steps: 0,
        }
    }

    pub fn max_norm(&self) -> f32 {
        self.max_norm
    }

    /// Norm of the most recent gradients, before clipping
    pub fn last_norm(&self) -> Option<f32> {
        self.last_norm
    }

    /// Steps on which the gradients were actually rescaled
    pub fn clipped_steps(&self) -> usize {
        self.clipped_steps
    }
}

impl CallbackHooks for GradientClipping {
    fn name(&self) -> &str {
        "GradientClipping"
    }

    fn on_train_begin(&mut self, _ctx: &RunContext) -> Result<()> {
        if !(self.max_norm.is_finite() && self.max_norm > 0.0) {
            return Err(Error::Config(format!(
                "gradient clipping threshold must be positive, got {}",
                self.max_norm
            )));
        }
        self.clipped_steps = 0;
        Ok(())
    }

    fn before_optimizer_step(&mut self, _ctx: &RunContext, params: &mut [Tensor]) -> Result<()> {
        let norm = clip_grad_norm(params, self.max_norm);
        if norm > self.max_norm {
            self.clipped_steps += 1;
        }
        self.last_norm = Some(norm);
        Ok(())
    }
}
