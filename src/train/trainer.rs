//! The fit/evaluate loop

use super::{EpochSummary, FitConfig, Phase, RunContext};
use crate::callback::{Callback, CallbackRegistry};
use crate::data::{BatchLoader, Dataset};
use crate::model::{Forward, ForwardOptions, Metrics, Model, RunningMean};
use crate::optim::Optimizer;
use crate::{Error, Result};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use std::time::Instant;
use tracing::{debug, info};

/// Attach the run position to a data or computation failure
fn at(epoch: usize, batch: usize, phase: Phase, source: Error) -> Error {
    Error::Run {
        epoch,
        batch,
        phase,
        source: Box::new(source),
    }
}

/// Unpack a labelled forward pass, rejecting a missing or non-finite loss
fn trained(forward: Forward) -> Result<(f64, Metrics)> {
    match forward {
        Forward::Trained { loss, metrics, .. } if loss.is_finite() => Ok((loss, metrics)),
        Forward::Trained { loss, .. } => Err(Error::Computation(format!("non-finite loss {loss}"))),
        Forward::Inferred { .. } => Err(Error::Computation(
            "model returned no loss for a labelled batch".to_string(),
        )),
    }
}

/// Drives a [`Model`] through epochs of training and validation
///
/// The trainer owns the model for the whole run. Callbacks are called in
/// registration order and only borrow the model inside hooks.
///
/// # Example
///
/// ```no_run
/// use fitloop::callback::{EarlyStopping, MonitorMode};
/// use fitloop::data::TensorDataset;
/// use fitloop::model::{GlobalAvgPool, ImageClassifier};
/// use fitloop::train::{FitConfig, Trainer};
/// use ndarray::Array2;
///
/// let data = TensorDataset::new(Array2::zeros((8, 3)), vec![0, 1, 0, 1, 0, 1, 0, 1]).unwrap();
/// let model = ImageClassifier::new(Box::new(GlobalAvgPool::new(3, 1, 1)), 2, 0);
///
/// let mut trainer = Trainer::new(Box::new(model), FitConfig::new().with_epochs(5));
/// trainer.add_callback(EarlyStopping::new("valid_loss", MonitorMode::Min, 2));
/// let ctx = trainer.fit(&data, Some(&data)).unwrap();
/// println!("ran {} epochs", ctx.epochs_completed());
/// ```
pub struct Trainer {
    model: Box<dyn Model>,
    config: FitConfig,
    callbacks: CallbackRegistry,
}

impl Trainer {
    pub fn new(model: Box<dyn Model>, config: FitConfig) -> Self {
        Self {
            model,
            config,
            callbacks: CallbackRegistry::new(),
        }
    }

    /// Register a callback; hooks run in registration order
    pub fn add_callback(&mut self, callback: impl Into<Callback>) {
        self.callbacks.add(callback);
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> &mut dyn Model {
        self.model.as_mut()
    }

    pub fn into_model(self) -> Box<dyn Model> {
        self.model
    }

    /// Train for `config.epochs` epochs, validating after each one
    ///
    /// Returns the final [`RunContext`]. With `epochs == 0` the initial context
    /// comes back untouched and no hook is called. Data and computation
    /// failures abort the run as [`Error::Run`] with the epoch and batch index;
    /// callback failures abort it as [`Error::Callback`].
    pub fn fit(&mut self, train: &dyn Dataset, valid: Option<&dyn Dataset>) -> Result<RunContext> {
        self.config.validate()?;
        let mut ctx = RunContext::new(self.config.epochs);
        if self.config.epochs == 0 {
            return Ok(ctx);
        }

        let train_loader = BatchLoader::new(train, self.config.train_loader())?;
        let valid_loader = valid
            .map(|d| BatchLoader::new(d, self.config.valid_loader()))
            .transpose()?;
        let mut optimizer = self.model.fetch_optimizer();

        info!(
            model = self.model.name(),
            train = train.name(),
            train_samples = train.len(),
            valid_samples = valid.map_or(0, |d| d.len()),
            epochs = self.config.epochs,
            optimizer = optimizer.name(),
            lr = optimizer.lr(),
            device = %self.config.device,
            precision = %self.config.precision,
            "Starting training"
        );

        let start = Instant::now();
        self.callbacks.on_train_begin(&ctx)?;

        for epoch in 0..self.config.epochs {
            let epoch_start = Instant::now();
            ctx.begin_epoch(epoch);
            self.callbacks.on_epoch_start(&mut ctx)?;

            self.train_epoch(&train_loader, optimizer.as_mut(), &mut ctx)?;
            if let Some(loader) = &valid_loader {
                ctx.phase = Phase::Valid;
                ctx.batch = 0;
                ctx.batches_per_epoch = loader.num_batches();
                let mean = self.evaluate_batches(loader, epoch)?;
                ctx.batch = loader.num_batches().saturating_sub(1);
                ctx.valid_loss = mean.loss();
                ctx.valid_metrics = mean.metrics();
            }

            ctx.elapsed = start.elapsed();
            self.callbacks.on_epoch_end(&mut ctx, self.model.as_mut())?;
            let summary = ctx.summary(epoch_start.elapsed());
            info!(
                epoch,
                train_loss = summary.train_loss,
                valid_loss = summary.valid_loss,
                "Epoch {}/{} done in {:.2?}",
                epoch + 1,
                self.config.epochs,
                summary.duration
            );
            ctx.history.push(summary);

            if ctx.stop_requested() {
                info!(epoch, "Stop requested, ending run");
                break;
            }
        }

        ctx.elapsed = start.elapsed();
        self.callbacks.on_train_end(&ctx)?;
        info!(
            epochs = ctx.epochs_completed(),
            steps = ctx.global_step,
            "Training finished in {:.2?}",
            ctx.elapsed
        );
        Ok(ctx)
    }

    fn train_epoch(
        &mut self,
        loader: &BatchLoader<'_>,
        optimizer: &mut dyn Optimizer,
        ctx: &mut RunContext,
    ) -> Result<()> {
        ctx.phase = Phase::Train;
        ctx.batches_per_epoch = loader.num_batches();
        let options = ForwardOptions::train().with_precision(self.config.precision);
        let mut mean = RunningMean::new();

        for (index, batch) in loader.epoch(ctx.epoch).enumerate() {
            ctx.batch = index;
            let epoch = ctx.epoch;
            let batch = batch.map_err(|e| at(epoch, index, Phase::Train, e))?;

            optimizer.zero_grad(self.model.parameters_mut());
            let (loss, metrics) = self
                .model
                .forward(&batch.inputs, Some(batch.labels.as_slice()), options)
                .and_then(trained)
                .map_err(|e| at(epoch, index, Phase::Train, e))?;

            self.callbacks
                .before_optimizer_step(ctx, self.model.parameters_mut())?;
            optimizer.step(self.model.parameters_mut());
            self.callbacks
                .after_optimizer_step(ctx, self.model.parameters_mut())?;
            ctx.global_step += 1;

            mean.update(loss, &metrics, batch.size());
            ctx.batch_loss = Some(loss);
            ctx.train_loss = mean.loss();
            ctx.train_metrics = mean.metrics();
            debug!(epoch, batch = index, loss, "Train step");

            self.callbacks.on_batch_end(ctx)?;
        }
        Ok(())
    }

    /// Labelled forward passes in eval mode, no parameter updates
    fn evaluate_batches(&mut self, loader: &BatchLoader<'_>, epoch: usize) -> Result<RunningMean> {
        let options = ForwardOptions::eval().with_precision(self.config.precision);
        let mut mean = RunningMean::new();
        for (index, batch) in loader.epoch(epoch).enumerate() {
            let batch = batch.map_err(|e| at(epoch, index, Phase::Valid, e))?;
            let (loss, metrics) = self
                .model
                .forward(&batch.inputs, Some(batch.labels.as_slice()), options)
                .and_then(trained)
                .map_err(|e| at(epoch, index, Phase::Valid, e))?;
            mean.update(loss, &metrics, batch.size());
            debug!(epoch, batch = index, loss, "Valid step");
        }
        Ok(mean)
    }

    /// Loss and metrics of the current model on `dataset`
    ///
    /// The result is reported in the `valid_*` fields of the summary.
    pub fn evaluate(&mut self, dataset: &dyn Dataset) -> Result<EpochSummary> {
        let started = Instant::now();
        let loader = BatchLoader::new(dataset, self.config.valid_loader())?;
        let mean = self.evaluate_batches(&loader, 0)?;
        Ok(EpochSummary {
            epoch: 0,
            train_loss: None,
            valid_loss: mean.loss(),
            train_metrics: Metrics::new(),
            valid_metrics: mean.metrics(),
            duration: started.elapsed(),
        })
    }

    /// Model outputs for every sample of `dataset`, in dataset order
    pub fn predict(&mut self, dataset: &dyn Dataset) -> Result<Array2<f32>> {
        let loader = BatchLoader::new(dataset, self.config.valid_loader())?;
        let options = ForwardOptions::eval().with_precision(self.config.precision);
        let mut outputs = Vec::with_capacity(loader.num_batches());
        for (index, batch) in loader.epoch(0).enumerate() {
            let batch = batch.map_err(|e| at(0, index, Phase::Valid, e))?;
            let forward = self
                .model
                .forward(&batch.inputs, None, options)
                .map_err(|e| at(0, index, Phase::Valid, e))?;
            outputs.push(forward.into_outputs());
        }
        if outputs.is_empty() {
            return Ok(Array2::zeros((0, 0)));
        }
        let views: Vec<ArrayView2<'_, f32>> = outputs.iter().map(|o| o.view()).collect();
        concatenate(Axis(0), &views).map_err(|e| Error::Computation(e.to_string()))
    }
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("model", &self.model.name())
            .field("config", &self.config)
            .field("callbacks", &self.callbacks.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{
        EarlyStopping, GradientClipping, History, HistoryLog, MonitorMode, Pruning,
    };
    use crate::data::TensorDataset;
    use crate::model::{GlobalAvgPool, ImageClassifier};
    use crate::ErrorKind;
    use ndarray::Array2;

    /// Two linearly separable classes in 2 features
    fn separable(n: usize) -> TensorDataset {
        let labels: Vec<usize> = (0..n).map(|i| i % 2).collect();
        let inputs = Array2::from_shape_fn((n, 2), |(i, j)| {
            let sign = if labels[i] == j { 1.0 } else { -1.0 };
            sign * (1.0 + (i % 3) as f32 * 0.1)
        });
        TensorDataset::new(inputs, labels).unwrap()
    }

    fn trainer(epochs: usize) -> Trainer {
        let model = ImageClassifier::new(Box::new(GlobalAvgPool::new(2, 1, 1)), 2, 1)
            .with_dropout(0.0)
            .with_learning_rate(0.05);
        let config = FitConfig::new()
            .with_batch_sizes(4, 4)
            .with_epochs(epochs)
            .with_seed(3);
        Trainer::new(Box::new(model), config)
    }

    #[test]
    fn test_zero_epochs_returns_initial_context() {
        let data = separable(10);
        let log = HistoryLog::new();
        let mut t = trainer(0);
        t.add_callback(History::with_log("h", log.clone()));
        let ctx = t.fit(&data, Some(&data)).unwrap();
        assert_eq!(ctx, RunContext::new(0));
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_fit_counts_steps_and_history() {
        let data = separable(10);
        let mut t = trainer(3);
        let ctx = t.fit(&data, Some(&data)).unwrap();
        assert_eq!(ctx.epochs_completed(), 3);
        // 10 samples in batches of 4 -> 3 steps per epoch
        assert_eq!(ctx.global_step, 9);
        assert!(ctx.history.iter().all(|s| s.valid_loss.is_some()));
        assert!(ctx.valid_metrics.contains_key("accuracy"));
    }

    #[test]
    fn test_loss_decreases_on_separable_data() {
        let data = separable(16);
        let mut t = trainer(20);
        let ctx = t.fit(&data, None).unwrap();
        let first = ctx.history[0].train_loss.unwrap();
        let last = ctx.history.last().unwrap().train_loss.unwrap();
        assert!(last < first, "loss went from {first} to {last}");
        assert!(ctx.valid_loss.is_none());
    }

    #[test]
    fn test_early_stopping_ends_run() {
        let data = separable(8);
        let mut t = trainer(10);
        // the loss improves every epoch, so monitor an unreachable maximum
        t.add_callback(EarlyStopping::new("train_loss", MonitorMode::Max, 1));
        let ctx = t.fit(&data, None).unwrap();
        assert!(ctx.stop_requested());
        assert_eq!(ctx.epochs_completed(), 2);
    }

    #[test]
    fn test_gradient_clipping_runs_before_each_step() {
        let data = separable(8);
        let mut t = trainer(1);
        t.add_callback(GradientClipping::new(1e-3));
        let ctx = t.fit(&data, None).unwrap();
        assert_eq!(ctx.global_step, 2);
    }

    #[test]
    fn test_unavailable_device_fails_before_hooks() {
        let data = separable(4);
        let log = HistoryLog::new();
        let mut t = trainer(1);
        t.config.device = crate::precision::Device::Cuda(0);
        t.add_callback(History::with_log("h", log.clone()));
        let err = t.fit(&data, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(log.events().is_empty());
    }

    #[test]
    fn test_bad_label_is_reported_with_position() {
        let inputs = Array2::zeros((6, 2));
        let data = TensorDataset::new(inputs, vec![0, 1, 0, 1, 0, 7]).unwrap();
        let mut t = trainer(1);
        t.config.shuffle = false;
        match t.fit(&data, None).unwrap_err() {
            Error::Run {
                epoch,
                batch,
                phase,
                source,
            } => {
                assert_eq!((epoch, batch, phase), (0, 1, Phase::Train));
                assert_eq!(source.kind(), ErrorKind::Computation);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_predict_and_evaluate() {
        let data = separable(10);
        let mut t = trainer(5);
        t.fit(&data, None).unwrap();

        let outputs = t.predict(&data).unwrap();
        assert_eq!(outputs.dim(), (10, 2));

        let summary = t.evaluate(&data).unwrap();
        assert!(summary.valid_loss.is_some());
        assert!(summary.train_loss.is_none());
        assert!(summary.valid_metrics["accuracy"] >= 0.5);
    }

    #[test]
    fn test_pruned_weights_stay_zero_through_later_epochs() {
        let labels: Vec<usize> = (0..12).map(|i| i % 2).collect();
        let inputs = Array2::from_shape_fn((12, 4), |(i, j)| {
            if labels[i] == j % 2 {
                1.0 + j as f32 * 0.1
            } else {
                -1.0
            }
        });
        let data = TensorDataset::new(inputs, labels).unwrap();
        let model = ImageClassifier::new(Box::new(GlobalAvgPool::new(4, 1, 1)), 2, 1)
            .with_dropout(0.0)
            .with_learning_rate(0.05);
        let config = FitConfig::new().with_batch_sizes(4, 4).with_epochs(3);
        let mut t = Trainer::new(Box::new(model), config);
        // prunes at the end of the second epoch, the third keeps stepping
        t.add_callback(Pruning::new(0.5).every(2));
        let ctx = t.fit(&data, None).unwrap();
        assert_eq!(ctx.global_step, 9);

        let weight = &t.model().parameters()[0];
        assert_eq!(weight.name(), "head.weight");
        let zeros = weight.data().iter().filter(|&&v| v == 0.0).count();
        assert_eq!(zeros, 4);
    }

    #[test]
    fn test_context_position_after_validation() {
        let train = separable(12);
        let valid = separable(6);
        let mut t = trainer(1);
        let ctx = t.fit(&train, Some(&valid)).unwrap();
        // 6 validation samples in batches of 4
        assert_eq!(ctx.phase, Phase::Valid);
        assert_eq!(ctx.batches_per_epoch, 2);
        assert_eq!(ctx.batch, 1);
    }
}
