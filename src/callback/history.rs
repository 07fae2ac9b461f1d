//! In-memory record of lifecycle events

use super::{CallbackAction, CallbackHooks};
use crate::model::Model;
use crate::train::{EpochSummary, RunContext};
use crate::{Error, Result};
use std::sync::{Arc, Mutex};

/// One observed hook invocation
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    TrainBegin { label: String },
    EpochStart { label: String, epoch: usize },
    BatchEnd { label: String, epoch: usize, batch: usize },
    EpochEnd { label: String, summary: EpochSummary },
    TrainEnd { label: String, epochs: usize },
}

impl LifecycleEvent {
    pub fn label(&self) -> &str {
        match self {
            LifecycleEvent::TrainBegin { label }
            | LifecycleEvent::EpochStart { label, .. }
            | LifecycleEvent::BatchEnd { label, .. }
            | LifecycleEvent::EpochEnd { label, .. }
            | LifecycleEvent::TrainEnd { label, .. } => label,
        }
    }

    /// Short tag such as `epoch_start`
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::TrainBegin { .. } => "train_begin",
            LifecycleEvent::EpochStart { .. } => "epoch_start",
            LifecycleEvent::BatchEnd { .. } => "batch_end",
            LifecycleEvent::EpochEnd { .. } => "epoch_end",
            LifecycleEvent::TrainEnd { .. } => "train_end",
        }
    }
}

/// Shared, append-only event list
///
/// Cloning yields another handle to the same list, so the events can be read
/// after the trainer that owns the callback has finished.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Per-epoch summaries, in order
    pub fn epochs(&self) -> Vec<EpochSummary> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::EpochEnd { summary, .. } => Some(summary),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: LifecycleEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| Error::Computation("history log lock poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

/// Records every hook it receives
#[derive(Debug, Clone)]
pub struct History {
    label: String,
    log: HistoryLog,
}

impl History {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_log(label, HistoryLog::new())
    }

    /// Record into an existing log, e.g. one shared with other callbacks
    pub fn with_log(label: impl Into<String>, log: HistoryLog) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }

    pub fn log(&self) -> HistoryLog {
        self.log.clone()
    }
}

impl CallbackHooks for History {
    fn name(&self) -> &str {
        "History"
    }

    fn on_train_begin(&mut self, _ctx: &RunContext) -> Result<()> {
        self.log.push(LifecycleEvent::TrainBegin {
            label: self.label.clone(),
        })
    }

    fn on_epoch_start(&mut self, ctx: &RunContext) -> Result<CallbackAction> {
        self.log.push(LifecycleEvent::EpochStart {
            label: self.label.clone(),
            epoch: ctx.epoch,
        })?;
        Ok(CallbackAction::Continue)
    }

    fn on_batch_end(&mut self, ctx: &RunContext) -> Result<CallbackAction> {
        self.log.push(LifecycleEvent::BatchEnd {
            label: self.label.clone(),
            epoch: ctx.epoch,
            batch: ctx.batch,
        })?;
        Ok(CallbackAction::Continue)
    }

    fn on_epoch_end(&mut self, ctx: &RunContext, _model: &mut dyn Model) -> Result<CallbackAction> {
        self.log.push(LifecycleEvent::EpochEnd {
            label: self.label.clone(),
            summary: ctx.summary(ctx.elapsed),
        })?;
        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self, ctx: &RunContext) -> Result<()> {
        self.log.push(LifecycleEvent::TrainEnd {
            label: self.label.clone(),
            epochs: ctx.epochs_completed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_log_interleaves_labels() {
        let log = HistoryLog::new();
        let mut a = History::with_log("a", log.clone());
        let mut b = History::with_log("b", log.clone());
        let ctx = RunContext::new(1);

        a.on_train_begin(&ctx).unwrap();
        b.on_train_begin(&ctx).unwrap();
        a.on_batch_end(&ctx).unwrap();

        let events = log.events();
        let labels: Vec<&str> = events.iter().map(LifecycleEvent::label).collect();
        assert_eq!(labels, vec!["a", "b", "a"]);
        assert_eq!(events[2].kind(), "batch_end");
    }
}
