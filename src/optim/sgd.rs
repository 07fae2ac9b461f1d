//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::Array1;

/// SGD optimizer with optional momentum
pub struct SGD {
    lr: f32,
    momentum: f32,
    velocities: Vec<Option<Array1<f32>>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocities: Vec::new(),
        }
    }

    fn ensure_velocities(&mut self, params: &[Tensor]) {
        if self.velocities.len() != params.len() {
            self.velocities = params.iter().map(|_| None).collect();
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_velocities(params);

        for (i, param) in params.iter_mut().enumerate() {
            if !param.requires_grad() {
                continue;
            }
            let Some(grad) = param.grad().cloned() else {
                continue;
            };

            if self.momentum > 0.0 {
                // v = momentum * v - lr * grad
                let velocity = match &self.velocities[i] {
                    Some(v) => v * self.momentum - &grad * self.lr,
                    None => &grad * (-self.lr),
                };
                *param.data_mut() += &velocity;
                self.velocities[i] = Some(velocity);
            } else {
                *param.data_mut() -= &(&grad * self.lr);
            }
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }

    fn name(&self) -> &str {
        "SGD"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sgd_plain_step() {
        let mut params = vec![Tensor::from_vec("w", vec![1.0, 2.0], true)];
        params[0].set_grad(ndarray::arr1(&[0.5, -1.0]));

        let mut sgd = SGD::new(0.1, 0.0);
        sgd.step(&mut params);

        assert_abs_diff_eq!(params[0].data()[0], 0.95, epsilon = 1e-6);
        assert_abs_diff_eq!(params[0].data()[1], 2.1, epsilon = 1e-6);
    }

    #[test]
    fn test_sgd_momentum_accumulates() {
        let mut params = vec![Tensor::from_vec("w", vec![0.0], true)];
        let mut sgd = SGD::new(1.0, 0.9);

        params[0].set_grad(ndarray::arr1(&[1.0]));
        sgd.step(&mut params);
        assert_abs_diff_eq!(params[0].data()[0], -1.0, epsilon = 1e-6);

        // v = 0.9 * -1 - 1 = -1.9
        sgd.step(&mut params);
        assert_abs_diff_eq!(params[0].data()[0], -2.9, epsilon = 1e-6);
    }
}
