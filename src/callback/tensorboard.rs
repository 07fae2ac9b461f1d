use super::{CallbackAction, CallbackHooks};
use crate::model::Model;
use crate::sink::{JsonlSink, MetricsSink};
use crate::train::RunContext;
use crate::Result;
use std::path::Path;

/// File the logger writes under its log directory
pub const SCALARS_FILE: &str = "scalars.jsonl";

/// Records scalars to a [`MetricsSink`]
///
/// - `train/batch_loss` at every global step
/// - `train/loss`, `valid/loss`, `train/<metric>` and `valid/<metric>` at
///   every epoch
pub struct TensorBoardLogger {
    sink: Box<dyn MetricsSink>,
}

impl TensorBoardLogger {
    /// Log to `<log_dir>/scalars.jsonl`
    pub fn new(log_dir: impl AsRef<Path>) -> Result<Self> {
        let sink = JsonlSink::open(log_dir.as_ref().join(SCALARS_FILE))?;
        Ok(Self::with_sink(Box::new(sink)))
    }

    pub fn with_sink(sink: Box<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

impl CallbackHooks for TensorBoardLogger {
    fn name(&self) -> &str {
        "TensorBoardLogger"
    }

    fn on_batch_end(&mut self, ctx: &RunContext) -> Result<CallbackAction> {
        if let Some(loss) = ctx.batch_loss {
            self.sink.record("train/batch_loss", loss, ctx.global_step)?;
        }
        Ok(CallbackAction::Continue)
    }

    fn on_epoch_end(&mut self, ctx: &RunContext, _model: &mut dyn Model) -> Result<CallbackAction> {
        let step = ctx.epoch;
        if let Some(loss) = ctx.train_loss {
            self.sink.record("train/loss", loss, step)?;
        }
        if let Some(loss) = ctx.valid_loss {
            self.sink.record("valid/loss", loss, step)?;
        }
        for (name, value) in &ctx.train_metrics {
            self.sink.record(&format!("train/{name}"), *value, step)?;
        }
        for (name, value) in &ctx.valid_metrics {
            self.sink.record(&format!("valid/{name}"), *value, step)?;
        }
        self.sink.flush()?;
        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self, _ctx: &RunContext) -> Result<()> {
        self.sink.flush()
    }
}
