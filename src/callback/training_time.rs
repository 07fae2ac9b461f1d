use super::{CallbackAction, CallbackHooks};
use crate::model::Model;
use crate::train::RunContext;
use crate::Result;
use std::time::{Duration, Instant};
use tracing::info;

/// Wall-clock time per epoch and for the whole run
#[derive(Debug, Clone, Default)]
pub struct TrainingTime {
    run_start: Option<Instant>,
    epoch_start: Option<Instant>,
    epochs: Vec<Duration>,
    total: Option<Duration>,
}

impl TrainingTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration of each completed epoch
    pub fn epoch_durations(&self) -> &[Duration] {
        &self.epochs
    }

    /// Sum of the completed epochs
    pub fn cumulative(&self) -> Duration {
        self.epochs.iter().sum()
    }

    /// Whole-run duration, available once training has ended
    pub fn total(&self) -> Option<Duration> {
        self.total
    }
}

impl CallbackHooks for TrainingTime {
    fn name(&self) -> &str {
        "TrainingTime"
    }

    fn on_train_begin(&mut self, _ctx: &RunContext) -> Result<()> {
        self.run_start = Some(Instant::now());
        self.epochs.clear();
        self.total = None;
        Ok(())
    }

    fn on_epoch_start(&mut self, _ctx: &RunContext) -> Result<CallbackAction> {
        self.epoch_start = Some(Instant::now());
        Ok(CallbackAction::Continue)
    }

    fn on_epoch_end(&mut self, ctx: &RunContext, _model: &mut dyn Model) -> Result<CallbackAction> {
        if let Some(start) = self.epoch_start.take() {
            let took = start.elapsed();
            self.epochs.push(took);
            info!(
                epoch = ctx.epoch,
                "Epoch took {:.2?} ({:.2?} so far)",
                took,
                self.cumulative()
            );
        }
        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self, _ctx: &RunContext) -> Result<()> {
        if let Some(start) = self.run_start.take() {
            let total = start.elapsed();
            self.total = Some(total);
            info!("Training took {:.2?}", total);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GlobalAvgPool, ImageClassifier};

    #[test]
    fn test_records_each_epoch() {
        let mut model = ImageClassifier::new(Box::new(GlobalAvgPool::new(2, 1, 1)), 2, 0);
        let mut timer = TrainingTime::new();
        let ctx = RunContext::new(2);

        timer.on_train_begin(&ctx).unwrap();
        for _ in 0..2 {
            timer.on_epoch_start(&ctx).unwrap();
            std::thread::sleep(Duration::from_millis(2));
            timer.on_epoch_end(&ctx, &mut model).unwrap();
        }
        assert!(timer.total().is_none());
        timer.on_train_end(&ctx).unwrap();

        assert_eq!(timer.epoch_durations().len(), 2);
        assert!(timer.cumulative() >= Duration::from_millis(4));
        assert!(timer.total().unwrap() >= timer.cumulative());
    }

    #[test]
    fn test_epoch_end_without_start_is_ignored() {
        let mut model = ImageClassifier::new(Box::new(GlobalAvgPool::new(2, 1, 1)), 2, 0);
        let mut timer = TrainingTime::new();
        timer
            .on_epoch_end(&RunContext::default(), &mut model)
            .unwrap();
        assert!(timer.epoch_durations().is_empty());
    }
}
