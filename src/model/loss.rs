//! Classification losses over raw logits
//!
//! Each loss returns the batch-mean value together with its gradient with
//! respect to the logits, which is all a linear head needs to be trained.

use crate::{Error, Result};
use ndarray::{Array2, ArrayView2, Axis};

/// Loss value and gradient for one batch
#[derive(Debug, Clone)]
pub struct LossOutput {
    /// Mean loss over the batch
    pub value: f64,
    /// `dL/dlogits`, same shape as the logits
    pub grad: Array2<f32>,
}

/// Trait for loss functions
pub trait LossFn: Send {
    /// Compute the mean loss of `logits` (`[batch, classes]`) against class
    /// indices
    fn compute(&self, logits: ArrayView2<'_, f32>, targets: &[usize]) -> Result<LossOutput>;

    /// Name of the loss function
    fn name(&self) -> &str;
}

/// Row-wise softmax with the max subtracted for stability
pub fn softmax(logits: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut probs = logits.to_owned();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    probs
}

fn check_targets(logits: &ArrayView2<'_, f32>, targets: &[usize]) -> Result<()> {
    if logits.nrows() != targets.len() {
        return Err(Error::ShapeMismatch {
            expected: vec![logits.nrows()],
            got: vec![targets.len()],
        });
    }
    let classes = logits.ncols();
    match targets.iter().find(|&&t| t >= classes) {
        Some(t) => Err(Error::Computation(format!(
            "target class {t} out of range for {classes} outputs"
        ))),
        None => Ok(()),
    }
}

/// Smoothed cross entropy: the target distribution puts `1 - smoothing` on
/// the true class and spreads `smoothing` uniformly over all classes.
fn smoothed_cross_entropy(
    logits: ArrayView2<'_, f32>,
    targets: &[usize],
    smoothing: f32,
) -> Result<LossOutput> {
    check_targets(&logits, targets)?;
    let batch = logits.nrows();
    if batch == 0 {
        return Ok(LossOutput {
            value: 0.0,
            grad: Array2::zeros(logits.raw_dim()),
        });
    }
    let classes = logits.ncols() as f32;
    let uniform = smoothing / classes;

    let mut total = 0.0f64;
    let mut grad = Array2::zeros(logits.raw_dim());
    for ((row, mut g), &t) in logits
        .axis_iter(Axis(0))
        .zip(grad.axis_iter_mut(Axis(0)))
        .zip(targets)
    {
        // log-sum-exp in f64; NaN logits propagate to the loss
        let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let lse = f64::from(max)
            + row
                .iter()
                .map(|&v| f64::from(v - max).exp())
                .sum::<f64>()
                .ln();
        if row.iter().any(|v| v.is_nan()) {
            total = f64::NAN;
        }

        let mut row_loss = 0.0f64;
        for (k, (&x, gk)) in row.iter().zip(g.iter_mut()).enumerate() {
            let q = if k == t { 1.0 - smoothing + uniform } else { uniform };
            let log_p = f64::from(x) - lse;
            if q > 0.0 {
                row_loss -= f64::from(q) * log_p;
            }
            *gk = (log_p.exp() as f32 - q) / batch as f32;
        }
        total += row_loss;
    }

    Ok(LossOutput {
        value: total / batch as f64,
        grad,
    })
}

/// Cross entropy against hard class indices
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl LossFn for CrossEntropy {
    fn compute(&self, logits: ArrayView2<'_, f32>, targets: &[usize]) -> Result<LossOutput> {
        smoothed_cross_entropy(logits, targets, 0.0)
    }

    fn name(&self) -> &str {
        "CrossEntropy"
    }
}

/// Cross entropy with label smoothing
#[derive(Debug, Clone, Copy)]
pub struct LabelSmoothingCrossEntropy {
    smoothing: f32,
}

impl LabelSmoothingCrossEntropy {
    pub fn new(smoothing: f32) -> Self {
        Self {
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    pub fn smoothing(&self) -> f32 {
        self.smoothing
    }
}

impl Default for LabelSmoothingCrossEntropy {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl LossFn for LabelSmoothingCrossEntropy {
    fn compute(&self, logits: ArrayView2<'_, f32>, targets: &[usize]) -> Result<LossOutput> {
        smoothed_cross_entropy(logits, targets, self.smoothing)
    }

    fn name(&self) -> &str {
        "LabelSmoothingCrossEntropy"
    }
}
