//! Model wrapper: forward pass, optional loss and metrics, optimizer binding
//!
//! A [`Model`] returns a [`Forward`] value: [`Forward::Trained`] when targets
//! were supplied and [`Forward::Inferred`] on the inference-only path.

mod classifier;
mod extractor;
mod loss;
mod metrics;

pub use classifier::{ImageClassifier, DEFAULT_LEARNING_RATE};
pub use extractor::{FeatureExtractor, FrozenProjection, GlobalAvgPool};
pub use loss::{softmax, CrossEntropy, LabelSmoothingCrossEntropy, LossFn, LossOutput};
pub use metrics::{argmax_rows, Accuracy, Metric, Metrics, RunningMean};

use crate::checkpoint::ModelState;
use crate::optim::Optimizer;
use crate::precision::Precision;
use crate::{Error, Result, Tensor};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Whether the forward pass is part of a training step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Dropout active; gradients written to trainable parameters
    Train,
    /// Dropout disabled; no gradients
    #[default]
    Eval,
}

/// Per-call forward configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForwardOptions {
    pub mode: Mode,
    pub precision: Precision,
}

impl ForwardOptions {
    pub fn train() -> Self {
        Self {
            mode: Mode::Train,
            ..Self::default()
        }
    }

    pub fn eval() -> Self {
        Self::default()
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }
}

/// Result of a forward pass
#[derive(Debug, Clone, PartialEq)]
pub enum Forward {
    /// Targets were given: outputs, mean loss and metrics
    Trained {
        outputs: Array2<f32>,
        loss: f64,
        metrics: Metrics,
    },
    /// Inference-only path
    Inferred { outputs: Array2<f32> },
}

impl Forward {
    pub fn outputs(&self) -> &Array2<f32> {
        match self {
            Forward::Trained { outputs, .. } | Forward::Inferred { outputs } => outputs,
        }
    }

    pub fn into_outputs(self) -> Array2<f32> {
        match self {
            Forward::Trained { outputs, .. } | Forward::Inferred { outputs } => outputs,
        }
    }

    pub fn loss(&self) -> Option<f64> {
        match self {
            Forward::Trained { loss, .. } => Some(*loss),
            Forward::Inferred { .. } => None,
        }
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        match self {
            Forward::Trained { metrics, .. } => Some(metrics),
            Forward::Inferred { .. } => None,
        }
    }
}

/// A trainable model driven by the trainer
pub trait Model: Send {
    /// Run the model on `[batch, features]` inputs.
    ///
    /// With `targets` the result is [`Forward::Trained`]; in [`Mode::Train`]
    /// the loss gradient is also accumulated on the trainable parameters.
    fn forward(
        &mut self,
        inputs: &Array2<f32>,
        targets: Option<&[usize]>,
        options: ForwardOptions,
    ) -> Result<Forward>;

    /// Bind an update rule to the trainable parameters; called once per run
    fn fetch_optimizer(&self) -> Box<dyn Optimizer>;

    /// Trainable parameters, in a stable order
    fn parameters(&self) -> &[Tensor];

    fn parameters_mut(&mut self) -> &mut [Tensor];

    /// Parameters that are part of the model but never updated
    fn frozen_parameters(&self) -> &[Tensor] {
        &[]
    }

    fn name(&self) -> &str;

    /// Snapshot of all parameters
    fn state(&self) -> ModelState {
        ModelState::capture(
            self.name(),
            self.parameters().iter().chain(self.frozen_parameters()),
        )
    }

    /// Restore trainable parameters from a snapshot, matched by name
    fn load_state(&mut self, state: &ModelState) -> Result<()> {
        for param in self.parameters_mut() {
            let saved = state.get(param.name()).ok_or_else(|| {
                Error::Serialization(format!("checkpoint has no tensor '{}'", param.name()))
            })?;
            if saved.shape != param.shape() {
                return Err(Error::ShapeMismatch {
                    expected: param.shape().to_vec(),
                    got: saved.shape.clone(),
                });
            }
            *param.data_mut() = Array1::from(saved.data.clone());
        }
        Ok(())
    }
}

/// Total and trainable parameter counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterCount {
    pub total: usize,
    pub trainable: usize,
}

pub fn count_parameters(model: &dyn Model) -> ParameterCount {
    let count = |params: &[Tensor], trainable_only: bool| {
        params
            .iter()
            .filter(|p| !trainable_only || p.requires_grad())
            .map(Tensor::len)
            .sum::<usize>()
    };
    let trainable = count(model.parameters(), true);
    let total = count(model.parameters(), false) + count(model.frozen_parameters(), false);
    ParameterCount { total, trainable }
}
