//! Run state shared with callbacks

use crate::model::Metrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which half of an epoch is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Train,
    Valid,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Train => f.write_str("train"),
            Phase::Valid => f.write_str("valid"),
        }
    }
}

/// Aggregated results of one completed epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochSummary {
    /// Epoch index (0-based)
    pub epoch: usize,
    pub train_loss: Option<f64>,
    pub valid_loss: Option<f64>,
    pub train_metrics: Metrics,
    pub valid_metrics: Metrics,
    /// Wall-clock duration of the epoch
    pub duration: Duration,
}

/// State of a single run
///
/// Created by the trainer at the start of `fit`, updated after every batch and
/// epoch, and returned when the run ends. Callbacks only ever see it through a
/// shared reference; the stop flag is set by the callback registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    /// Planned number of epochs
    pub max_epochs: usize,
    pub phase: Phase,
    /// Batch index within the current phase
    pub batch: usize,
    /// Batches per epoch in the current phase
    pub batches_per_epoch: usize,
    /// Optimizer steps taken so far
    pub global_step: usize,
    /// Loss of the most recent batch
    pub batch_loss: Option<f64>,
    /// Running mean training loss of the current epoch
    pub train_loss: Option<f64>,
    /// Validation loss of the current epoch
    pub valid_loss: Option<f64>,
    pub train_metrics: Metrics,
    pub valid_metrics: Metrics,
    /// Completed epochs, oldest first
    pub history: Vec<EpochSummary>,
    /// Time since the run started
    pub elapsed: Duration,
    stop_requested: bool,
}

impl RunContext {
    pub fn new(max_epochs: usize) -> Self {
        Self {
            max_epochs,
            ..Self::default()
        }
    }

    /// Whether a callback asked the run to end after the current epoch
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub(crate) fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Number of epochs that ran to completion
    pub fn epochs_completed(&self) -> usize {
        self.history.len()
    }

    /// Look up a monitored quantity by name
    ///
    /// Accepts `train_loss`, `valid_loss`, and `train_<metric>` /
    /// `valid_<metric>` for any metric the model reports.
    pub fn metric(&self, name: &str) -> Option<f64> {
        match name {
            "train_loss" => self.train_loss,
            "valid_loss" => self.valid_loss,
            _ => {
                if let Some(m) = name.strip_prefix("train_") {
                    self.train_metrics.get(m).copied()
                } else if let Some(m) = name.strip_prefix("valid_") {
                    self.valid_metrics.get(m).copied()
                } else {
                    None
                }
            }
        }
    }

    /// Reset per-epoch aggregates at the start of an epoch
    pub(crate) fn begin_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.phase = Phase::Train;
        self.batch = 0;
        self.batch_loss = None;
        self.train_loss = None;
        self.valid_loss = None;
        self.train_metrics.clear();
        self.valid_metrics.clear();
    }

    pub(crate) fn summary(&self, duration: Duration) -> EpochSummary {
        EpochSummary {
            epoch: self.epoch,
            train_loss: self.train_loss,
            valid_loss: self.valid_loss,
            train_metrics: self.train_metrics.clone(),
            valid_metrics: self.valid_metrics.clone(),
            duration,
        }
    }
}

/// Whether `name` can be resolved by [`RunContext::metric`]
pub fn is_monitorable(name: &str) -> bool {
    matches!(name, "train_loss" | "valid_loss")
        || name.strip_prefix("train_").is_some_and(|m| !m.is_empty())
        || name.strip_prefix("valid_").is_some_and(|m| !m.is_empty())
}
