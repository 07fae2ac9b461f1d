//! Feature extractor + dropout + linear classification head

use super::extractor::FeatureExtractor;
use super::loss::{LabelSmoothingCrossEntropy, LossFn};
use super::metrics::{Accuracy, Metric, Metrics};
use super::{Forward, ForwardOptions, Mode, Model};
use crate::optim::{AdamW, Optimizer};
use crate::{Error, Result, Tensor};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default learning rate handed to the optimizer
pub const DEFAULT_LEARNING_RATE: f32 = 1e-4;

/// Image classifier over a frozen feature extractor
///
/// Only the head (`head.weight`, `head.bias`) is trainable. In
/// [`Mode::Train`] with targets, `forward` leaves `dL/dW` and `dL/db` on the
/// head parameters for the optimizer to consume.
pub struct ImageClassifier {
    name: String,
    extractor: Box<dyn FeatureExtractor>,
    /// `[head.weight (classes x width), head.bias (classes)]`
    head: Vec<Tensor>,
    dropout: f32,
    loss: Box<dyn LossFn>,
    metrics: Vec<Box<dyn Metric>>,
    learning_rate: f32,
    rng: StdRng,
}

impl ImageClassifier {
    /// Build a classifier with label-smoothing loss (0.1), accuracy metric,
    /// dropout 0.1 and a seeded head initialisation
    pub fn new(extractor: Box<dyn FeatureExtractor>, num_classes: usize, seed: u64) -> Self {
        let width = extractor.output_width();
        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (width.max(1) as f32).sqrt();
        let weight: Array1<f32> = (0..num_classes * width)
            .map(|_| rng.random_range(-bound..=bound))
            .collect();
        let bias: Array1<f32> = (0..num_classes)
            .map(|_| rng.random_range(-bound..=bound))
            .collect();

        Self {
            name: "image-classifier".to_string(),
            extractor,
            head: vec![
                Tensor::new("head.weight", vec![num_classes, width], weight, true),
                Tensor::new("head.bias", vec![num_classes], bias, true),
            ],
            dropout: 0.1,
            loss: Box::new(LabelSmoothingCrossEntropy::default()),
            metrics: vec![Box::new(Accuracy)],
            learning_rate: DEFAULT_LEARNING_RATE,
            rng,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_dropout(mut self, p: f32) -> Self {
        self.dropout = p.clamp(0.0, 0.99);
        self
    }

    pub fn with_loss(mut self, loss: Box<dyn LossFn>) -> Self {
        self.loss = loss;
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<Box<dyn Metric>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn num_classes(&self) -> usize {
        self.head[0].shape()[0]
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    /// Inverted dropout: zero with probability `p`, scale survivors by `1/(1-p)`
    fn apply_dropout(&mut self, features: &mut Array2<f32>) {
        let p = self.dropout;
        let scale = 1.0 / (1.0 - p);
        let rng = &mut self.rng;
        features.mapv_inplace(|v| {
            if rng.random::<f32>() < p {
                0.0
            } else {
                v * scale
            }
        });
    }
}

impl std::fmt::Debug for ImageClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageClassifier")
            .field("name", &self.name)
            .field("width", &self.extractor.output_width())
            .field("head", &self.head)
            .field("dropout", &self.dropout)
            .field("learning_rate", &self.learning_rate)
            .finish()
    }
}

impl Model for ImageClassifier {
    fn forward(
        &mut self,
        inputs: &Array2<f32>,
        targets: Option<&[usize]>,
        options: ForwardOptions,
    ) -> Result<Forward> {
        let mut features = self.extractor.extract_features(inputs)?;
        if options.mode == Mode::Train && self.dropout > 0.0 {
            self.apply_dropout(&mut features);
        }

        let mut logits = features.dot(&self.head[0].view2().t()) + self.head[1].data();
        options.precision.round_array(&mut logits);

        let Some(targets) = targets else {
            return Ok(Forward::Inferred { outputs: logits });
        };

        let loss = self.loss.compute(logits.view(), targets)?;
        if !loss.value.is_finite() {
            return Err(Error::Computation(format!(
                "{} loss is not finite ({})",
                self.loss.name(),
                loss.value
            )));
        }

        let metrics: Metrics = self
            .metrics
            .iter()
            .map(|m| (m.name().to_string(), m.compute(logits.view(), targets)))
            .collect();

        if options.mode == Mode::Train {
            // dL/dW = G^T H, dL/db = sum_rows(G)
            let grad_w = loss.grad.t().dot(&features);
            let grad_b = loss.grad.sum_axis(Axis(0));
            let (w, b) = self.head.split_at_mut(1);
            if w[0].requires_grad() {
                w[0].accumulate_grad(Array1::from_iter(grad_w.iter().copied()));
            }
            if b[0].requires_grad() {
                b[0].accumulate_grad(grad_b);
            }
        }

        Ok(Forward::Trained {
            outputs: logits,
            loss: loss.value,
            metrics,
        })
    }

    fn fetch_optimizer(&self) -> Box<dyn Optimizer> {
        Box::new(AdamW::default_params(self.learning_rate))
    }

    fn parameters(&self) -> &[Tensor] {
        &self.head
    }

    fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.head
    }

    fn frozen_parameters(&self) -> &[Tensor] {
        self.extractor.frozen_parameters()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
