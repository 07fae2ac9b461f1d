//! Early stopping with checkpoint-on-improvement

use super::{CallbackAction, CallbackHooks};
use crate::model::Model;
use crate::train::RunContext;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Direction in which the monitored value improves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Min,
    Max,
}

impl MonitorMode {
    /// Whether `value` beats `best` by more than `delta`
    pub fn improves(&self, value: f64, best: f64, delta: f64) -> bool {
        match self {
            MonitorMode::Min => value < best - delta,
            MonitorMode::Max => value > best + delta,
        }
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorMode::Min => f.write_str("min"),
            MonitorMode::Max => f.write_str("max"),
        }
    }
}

impl FromStr for MonitorMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "min" => Ok(MonitorMode::Min),
            "max" => Ok(MonitorMode::Max),
            _ => Err(format!("unknown monitor mode '{s}' (expected min or max)")),
        }
    }
}

/// Stop when the monitored value has not improved for `patience` epochs
///
/// The first epoch sets the baseline. Every later epoch either improves on the
/// best value by more than `delta` (resetting the counter and, when a model
/// path is set, saving a checkpoint) or increments the counter. Stop is
/// requested once the counter reaches `patience`.
///
/// With `patience = 3` and a flat sequence, epochs 2, 3 and 4 fail to improve
/// and stop is requested at the end of epoch 4.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: String,
    mode: MonitorMode,
    patience: usize,
    delta: f64,
    model_path: Option<PathBuf>,
    best: Option<f64>,
    best_epoch: Option<usize>,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(monitor: impl Into<String>, mode: MonitorMode, patience: usize) -> Self {
        Self {
            monitor: monitor.into(),
            mode,
            patience,
            delta: 0.0,
            model_path: None,
            best: None,
            best_epoch: None,
            wait: 0,
            stopped_epoch: None,
        }
    }

    /// Minimum change that counts as an improvement
    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta.abs();
        self
    }

    /// Save the model here every time the monitored value improves
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn monitor(&self) -> &str {
        &self.monitor
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    /// Consecutive epochs without improvement
    pub fn wait(&self) -> usize {
        self.wait
    }

    /// First epoch that asked the run to stop
    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    /// Feed one epoch's value and classify it against the best so far
    pub fn observe(&mut self, epoch: usize, value: f64) -> Improvement {
        let improved = match self.best {
            None => value.is_finite(),
            Some(best) => self.mode.improves(value, best, self.delta),
        };

        if improved {
            self.best = Some(value);
            self.best_epoch = Some(epoch);
            self.wait = 0;
            return Improvement::Improved;
        }

        // A non-finite first value leaves no baseline; it still counts
        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped_epoch.get_or_insert(epoch);
            Improvement::Exhausted
        } else {
            Improvement::Stale
        }
    }

    fn save(&self, ctx: &RunContext, value: f64, model: &dyn Model) -> Result<()> {
        let Some(path) = &self.model_path else {
            return Ok(());
        };
        model
            .state()
            .with_metadata("epoch", ctx.epoch.to_string())
            .with_metadata("monitor", self.monitor.clone())
            .with_metadata("score", value.to_string())
            .save(path)?;
        info!(
            epoch = ctx.epoch,
            monitor = %self.monitor,
            score = value,
            path = %path.display(),
            "Validation score improved, saving model"
        );
        Ok(())
    }
}

/// Outcome of one [`EarlyStopping::observe`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Improvement {
    Improved,
    Stale,
    Exhausted,
}

impl CallbackHooks for EarlyStopping {
    fn name(&self) -> &str {
        "EarlyStopping"
    }

    fn on_train_begin(&mut self, _ctx: &RunContext) -> Result<()> {
        self.best = None;
        self.best_epoch = None;
        self.wait = 0;
        self.stopped_epoch = None;
        Ok(())
    }

    fn on_epoch_end(&mut self, ctx: &RunContext, model: &mut dyn Model) -> Result<CallbackAction> {
        let value = ctx.metric(&self.monitor).ok_or_else(|| {
            Error::Config(format!(
                "monitored metric '{}' is not available at the end of epoch {}",
                self.monitor, ctx.epoch
            ))
        })?;

        match self.observe(ctx.epoch, value) {
            Improvement::Improved => {
                self.save(ctx, value, model)?;
                Ok(CallbackAction::Continue)
            }
            Improvement::Stale => {
                debug!(
                    epoch = ctx.epoch,
                    wait = self.wait,
                    patience = self.patience,
                    "EarlyStopping counter"
                );
                Ok(CallbackAction::Continue)
            }
            Improvement::Exhausted => {
                info!(
                    epoch = ctx.epoch,
                    best = ?self.best,
                    "No improvement for {} epochs, stopping", self.wait
                );
                Ok(CallbackAction::Stop)
            }
        }
    }
}
