//! Integration tests for the fit loop and callback dispatch

use fitloop::callback::{EarlyStopping, History, HistoryLog, LifecycleEvent, MonitorMode};
use fitloop::checkpoint::ModelState;
use fitloop::data::TensorDataset;
use fitloop::model::{CrossEntropy, Forward, ForwardOptions, LossFn, Mode, Model};
use fitloop::optim::{Optimizer, SGD};
use fitloop::{Error, ErrorKind, FitConfig, Result, RunContext, Tensor, Trainer};
use ndarray::Array2;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Model whose logits are its inputs; records every forward call
struct Passthrough {
    bias: [Tensor; 1],
    calls: Arc<Mutex<Vec<(Mode, usize)>>>,
}

impl Passthrough {
    fn new(classes: usize) -> (Self, Arc<Mutex<Vec<(Mode, usize)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let model = Self {
            bias: [Tensor::zeros("passthrough.bias", vec![classes], true)],
            calls: calls.clone(),
        };
        (model, calls)
    }
}

impl Model for Passthrough {
    fn forward(
        &mut self,
        inputs: &Array2<f32>,
        targets: Option<&[usize]>,
        options: ForwardOptions,
    ) -> Result<Forward> {
        self.calls
            .lock()
            .unwrap()
            .push((options.mode, inputs.nrows()));
        let outputs = inputs.clone();
        let Some(targets) = targets else {
            return Ok(Forward::Inferred { outputs });
        };
        let loss = CrossEntropy.compute(outputs.view(), targets)?;
        if !loss.value.is_finite() {
            return Err(Error::Computation(format!("loss is {}", loss.value)));
        }
        Ok(Forward::Trained {
            outputs,
            loss: loss.value,
            metrics: Default::default(),
        })
    }

    fn fetch_optimizer(&self) -> Box<dyn Optimizer> {
        Box::new(SGD::new(0.1, 0.0))
    }

    fn parameters(&self) -> &[Tensor] {
        &self.bias
    }

    fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.bias
    }

    fn name(&self) -> &str {
        "passthrough"
    }
}

fn zeros(n: usize, classes: usize) -> TensorDataset {
    TensorDataset::new(Array2::zeros((n, classes)), (0..n).map(|i| i % classes).collect())
        .unwrap()
}

fn config(epochs: usize) -> FitConfig {
    FitConfig::new()
        .with_batch_sizes(4, 4)
        .with_epochs(epochs)
        .with_seed(11)
}

#[test]
fn test_ten_samples_in_batches_of_four() {
    let (model, calls) = Passthrough::new(2);
    let data = zeros(10, 2);
    let mut trainer = Trainer::new(Box::new(model), config(1));
    let ctx = trainer.fit(&data, Some(&data)).unwrap();

    let calls = calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            (Mode::Train, 4),
            (Mode::Train, 4),
            (Mode::Train, 2),
            (Mode::Eval, 4),
            (Mode::Eval, 4),
            (Mode::Eval, 2),
        ]
    );
    assert_eq!(ctx.global_step, 3);
    assert_eq!(ctx.epochs_completed(), 1);
}

#[test]
fn test_callbacks_fire_in_registration_order() {
    let (model, _) = Passthrough::new(2);
    let data = zeros(6, 2);
    let log = HistoryLog::new();
    let mut trainer = Trainer::new(Box::new(model), config(2));
    trainer.add_callback(History::with_log("first", log.clone()));
    trainer.add_callback(History::with_log("second", log.clone()));
    trainer.fit(&data, Some(&data)).unwrap();

    let events = log.events();
    let trace: Vec<(&str, &str)> = events.iter().map(|e| (e.kind(), e.label())).collect();

    let mut expected = vec![("train_begin", "first"), ("train_begin", "second")];
    for _ in 0..2 {
        expected.extend([("epoch_start", "first"), ("epoch_start", "second")]);
        for _ in 0..2 {
            expected.extend([("batch_end", "first"), ("batch_end", "second")]);
        }
        expected.extend([("epoch_end", "first"), ("epoch_end", "second")]);
    }
    expected.extend([("train_end", "first"), ("train_end", "second")]);
    assert_eq!(trace, expected);

    // batch indices restart every epoch
    let batches: Vec<(usize, usize)> = events
        .iter()
        .filter_map(|e| match e {
            LifecycleEvent::BatchEnd {
                label,
                epoch,
                batch,
            } if label == "first" => Some((*epoch, *batch)),
            _ => None,
        })
        .collect();
    assert_eq!(batches, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
}

#[test]
fn test_early_stopping_on_flat_valid_loss() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("best.bin");
    let (model, _) = Passthrough::new(2);
    let data = zeros(8, 2);

    let mut trainer = Trainer::new(Box::new(model), config(10));
    trainer.add_callback(
        EarlyStopping::new("valid_loss", MonitorMode::Min, 3).with_model_path(&path),
    );
    let ctx = trainer.fit(&data, Some(&data)).unwrap();

    // baseline at epoch 1, epochs 2-4 stale, stop at the end of epoch 4
    assert!(ctx.stop_requested());
    assert_eq!(ctx.epochs_completed(), 4);
    assert_eq!(ctx.epoch, 3);

    let saved = ModelState::load(&path).unwrap();
    assert_eq!(saved.metadata.get("epoch").map(String::as_str), Some("0"));
    assert_eq!(saved.model_name, "passthrough");
}

#[test]
fn test_zero_epochs_is_a_no_op() {
    let (model, calls) = Passthrough::new(2);
    let data = zeros(4, 2);
    let log = HistoryLog::new();
    let mut trainer = Trainer::new(Box::new(model), config(0));
    trainer.add_callback(History::with_log("h", log.clone()));

    let ctx = trainer.fit(&data, Some(&data)).unwrap();
    assert_eq!(ctx, RunContext::new(0));
    assert!(log.events().is_empty());
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_non_finite_loss_aborts_with_position() {
    let (model, _) = Passthrough::new(2);
    let mut inputs = Array2::zeros((8, 2));
    inputs[[5, 0]] = f32::NAN;
    let data = TensorDataset::new(inputs, vec![0, 1, 0, 1, 0, 1, 0, 1]).unwrap();
    let log = HistoryLog::new();

    let mut trainer = Trainer::new(Box::new(model), config(3).with_shuffle(false));
    trainer.add_callback(History::with_log("h", log.clone()));
    let err = trainer.fit(&data, None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Computation);
    match err {
        Error::Run { epoch, batch, .. } => assert_eq!((epoch, batch), (0, 1)),
        other => panic!("unexpected error {other:?}"),
    }
    // the run stopped without finishing the epoch
    assert!(log.events().iter().all(|e| e.kind() != "epoch_end"));
}

#[test]
fn test_missing_monitor_is_callback_error() {
    let (model, _) = Passthrough::new(2);
    let data = zeros(4, 2);
    let mut trainer = Trainer::new(Box::new(model), config(2));
    trainer.add_callback(EarlyStopping::new("valid_accuracy", MonitorMode::Max, 1));

    let err = trainer.fit(&data, Some(&data)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Callback);
    assert!(err.to_string().contains("EarlyStopping"));
}
