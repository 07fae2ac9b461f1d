//! Lifecycle callbacks and their ordered registry
//!
//! Hooks, in the order the trainer fires them:
//! - `on_train_begin`
//! - per epoch: `on_epoch_start`, then per training batch
//!   `before_optimizer_step`, `after_optimizer_step` and `on_batch_end`,
//!   then `on_epoch_end`
//! - `on_train_end`
//!
//! Every callback is a variant of [`Callback`]; the registry dispatches to
//! each in registration order. Callbacks see the [`RunContext`] read-only and
//! ask for termination by returning [`CallbackAction::Stop`]. The stop takes
//! effect once the current epoch has finished.

mod early_stopping;
mod gradient_clipping;
mod history;
mod plot_loss;
mod pruning;
mod tensorboard;
mod training_time;

pub use early_stopping::{EarlyStopping, Improvement, MonitorMode};
pub use gradient_clipping::GradientClipping;
pub use history::{History, HistoryLog, LifecycleEvent};
pub use plot_loss::PlotLoss;
pub use pruning::Pruning;
pub use tensorboard::TensorBoardLogger;
pub use training_time::TrainingTime;

use crate::model::Model;
use crate::train::RunContext;
use crate::{Error, Result, Tensor};

/// What a hook asks the trainer to do next
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CallbackAction {
    /// Continue training normally
    #[default]
    Continue,
    /// End the run after the current epoch
    Stop,
}

/// Hooks a callback can implement; all default to no-ops
pub trait CallbackHooks {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    /// Called once before the first epoch
    fn on_train_begin(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }

    fn on_epoch_start(&mut self, _ctx: &RunContext) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    /// Called with the freshly computed gradients, before the update
    fn before_optimizer_step(&mut self, _ctx: &RunContext, _params: &mut [Tensor]) -> Result<()> {
        Ok(())
    }

    /// Called with the updated parameters, right after the update
    fn after_optimizer_step(&mut self, _ctx: &RunContext, _params: &mut [Tensor]) -> Result<()> {
        Ok(())
    }

    fn on_batch_end(&mut self, _ctx: &RunContext) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    /// Called after validation; the model is lent for checkpointing and pruning
    fn on_epoch_end(&mut self, _ctx: &RunContext, _model: &mut dyn Model) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    /// Called once after the last epoch, including after an early stop
    fn on_train_end(&mut self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }
}

/// The closed set of callbacks the trainer knows how to run
pub enum Callback {
    EarlyStopping(EarlyStopping),
    GradientClipping(GradientClipping),
    Pruning(Pruning),
    TensorBoard(TensorBoardLogger),
    PlotLoss(PlotLoss),
    TrainingTime(TrainingTime),
    History(History),
}

impl Callback {
    fn hooks(&mut self) -> &mut dyn CallbackHooks {
        match self {
            Callback::EarlyStopping(cb) => cb,
            Callback::GradientClipping(cb) => cb,
            Callback::Pruning(cb) => cb,
            Callback::TensorBoard(cb) => cb,
            Callback::PlotLoss(cb) => cb,
            Callback::TrainingTime(cb) => cb,
            Callback::History(cb) => cb,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Callback::EarlyStopping(cb) => cb.name(),
            Callback::GradientClipping(cb) => cb.name(),
            Callback::Pruning(cb) => cb.name(),
            Callback::TensorBoard(cb) => cb.name(),
            Callback::PlotLoss(cb) => cb.name(),
            Callback::TrainingTime(cb) => cb.name(),
            Callback::History(cb) => cb.name(),
        }
    }
}

macro_rules! impl_from_callback {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(impl From<$ty> for Callback {
            fn from(cb: $ty) -> Self {
                Callback::$variant(cb)
            }
        })*
    };
}

impl_from_callback!(
    EarlyStopping => EarlyStopping,
    GradientClipping => GradientClipping,
    Pruning => Pruning,
    TensorBoard => TensorBoardLogger,
    PlotLoss => PlotLoss,
    TrainingTime => TrainingTime,
    History => History,
);

fn wrap(cb: &Callback, hook: &'static str, source: Error) -> Error {
    Error::Callback {
        name: cb.name().to_string(),
        hook,
        source: Box::new(source),
    }
}

/// Ordered set of callbacks
///
/// Every callback sees every hook, even after an earlier one asked to stop.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: Vec<Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, callback: impl Into<Callback>) {
        self.callbacks.push(callback.into());
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.callbacks.iter().map(Callback::name).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Callback> {
        self.callbacks.iter()
    }

    pub(crate) fn on_train_begin(&mut self, ctx: &RunContext) -> Result<()> {
        for cb in &mut self.callbacks {
            if let Err(e) = cb.hooks().on_train_begin(ctx) {
                return Err(wrap(cb, "on_train_begin", e));
            }
        }
        Ok(())
    }

    pub(crate) fn on_epoch_start(&mut self, ctx: &mut RunContext) -> Result<()> {
        let mut stop = false;
        for cb in &mut self.callbacks {
            let result = cb.hooks().on_epoch_start(ctx);
            match result {
                Ok(action) => stop |= action == CallbackAction::Stop,
                Err(e) => return Err(wrap(cb, "on_epoch_start", e)),
            }
        }
        if stop {
            ctx.request_stop();
        }
        Ok(())
    }

    pub(crate) fn before_optimizer_step(
        &mut self,
        ctx: &RunContext,
        params: &mut [Tensor],
    ) -> Result<()> {
        for cb in &mut self.callbacks {
            if let Err(e) = cb.hooks().before_optimizer_step(ctx, params) {
                return Err(wrap(cb, "before_optimizer_step", e));
            }
        }
        Ok(())
    }

    pub(crate) fn after_optimizer_step(
        &mut self,
        ctx: &RunContext,
        params: &mut [Tensor],
    ) -> Result<()> {
        for cb in &mut self.callbacks {
            if let Err(e) = cb.hooks().after_optimizer_step(ctx, params) {
                return Err(wrap(cb, "after_optimizer_step", e));
            }
        }
        Ok(())
    }

    pub(crate) fn on_batch_end(&mut self, ctx: &mut RunContext) -> Result<()> {
        let mut stop = false;
        for cb in &mut self.callbacks {
            let result = cb.hooks().on_batch_end(ctx);
            match result {
                Ok(action) => stop |= action == CallbackAction::Stop,
                Err(e) => return Err(wrap(cb, "on_batch_end", e)),
            }
        }
        if stop {
            ctx.request_stop();
        }
        Ok(())
    }

    pub(crate) fn on_epoch_end(&mut self, ctx: &mut RunContext, model: &mut dyn Model) -> Result<()> {
        let mut stop = false;
        for cb in &mut self.callbacks {
            let result = cb.hooks().on_epoch_end(ctx, model);
            match result {
                Ok(action) => stop |= action == CallbackAction::Stop,
                Err(e) => return Err(wrap(cb, "on_epoch_end", e)),
            }
        }
        if stop {
            ctx.request_stop();
        }
        Ok(())
    }

    pub(crate) fn on_train_end(&mut self, ctx: &RunContext) -> Result<()> {
        for cb in &mut self.callbacks {
            if let Err(e) = cb.hooks().on_train_end(ctx) {
                return Err(wrap(cb, "on_train_end", e));
            }
        }
        Ok(())
    }
}
