//! Evaluation metrics and their running aggregation

use ndarray::{ArrayView2, Axis};
use std::collections::BTreeMap;

/// Named metric values for one batch or one epoch
pub type Metrics = BTreeMap<String, f64>;

/// Trait for evaluation metrics
pub trait Metric: Send {
    /// Compute the metric of `logits` (`[batch, classes]`) against class indices
    fn compute(&self, logits: ArrayView2<'_, f32>, targets: &[usize]) -> f64;

    /// Name of the metric
    fn name(&self) -> &str;

    /// Whether higher values are better (true) or lower (false)
    fn higher_is_better(&self) -> bool {
        true
    }
}

/// Index of the largest logit in each row
pub fn argmax_rows(logits: ArrayView2<'_, f32>) -> Vec<usize> {
    logits
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
                    if v > bv {
                        (i, v)
                    } else {
                        (bi, bv)
                    }
                })
                .0
        })
        .collect()
}

/// Fraction of rows whose argmax equals the target
#[derive(Debug, Clone, Copy, Default)]
pub struct Accuracy;

impl Metric for Accuracy {
    fn compute(&self, logits: ArrayView2<'_, f32>, targets: &[usize]) -> f64 {
        if targets.is_empty() {
            return 0.0;
        }
        let correct = argmax_rows(logits)
            .iter()
            .zip(targets)
            .filter(|(p, t)| p == t)
            .count();
        correct as f64 / targets.len() as f64
    }

    fn name(&self) -> &str {
        "accuracy"
    }
}

/// Batch-size weighted running mean of a loss and a metrics map
///
/// All sums are kept in `f64` regardless of the forward precision.
#[derive(Debug, Clone, Default)]
pub struct RunningMean {
    loss_sum: f64,
    metric_sums: BTreeMap<String, f64>,
    count: usize,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch of `n` samples
    pub fn update(&mut self, loss: f64, metrics: &Metrics, n: usize) {
        let w = n as f64;
        self.loss_sum += loss * w;
        for (name, value) in metrics {
            *self.metric_sums.entry(name.clone()).or_insert(0.0) += value * w;
        }
        self.count += n;
    }

    /// Samples seen so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean loss, `None` before the first update
    pub fn loss(&self) -> Option<f64> {
        (self.count > 0).then(|| self.loss_sum / self.count as f64)
    }

    pub fn metrics(&self) -> Metrics {
        if self.count == 0 {
            return Metrics::new();
        }
        self.metric_sums
            .iter()
            .map(|(k, v)| (k.clone(), v / self.count as f64))
            .collect()
    }
}
