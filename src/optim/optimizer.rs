//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
///
/// Implementations update only parameters that require gradients and
/// currently hold one.
pub trait Optimizer: Send {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [Tensor]) {
        for param in params {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);

    /// Name used in logs
    fn name(&self) -> &str;
}
