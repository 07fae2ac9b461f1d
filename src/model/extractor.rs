//! Pretrained feature extractors
//!
//! The extractor is an opaque function with a fixed output width. Its weights
//! are never trained; they are reported as frozen parameters so they show up in
//! checkpoints and parameter counts.

use crate::checkpoint::ModelState;
use crate::{Error, Result, Tensor};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Maps a batch of flattened inputs to a batch of feature vectors
pub trait FeatureExtractor: Send {
    /// `[batch, input_width]` -> `[batch, output_width]`
    fn extract_features(&self, inputs: &Array2<f32>) -> Result<Array2<f32>>;

    /// Expected length of one flattened input
    fn input_width(&self) -> usize;

    /// Length of one feature vector
    fn output_width(&self) -> usize;

    /// Frozen weights owned by the extractor
    fn frozen_parameters(&self) -> &[Tensor] {
        &[]
    }

    fn name(&self) -> &str;
}

fn check_width(inputs: &Array2<f32>, expected: usize) -> Result<()> {
    if inputs.ncols() == expected {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            expected: vec![inputs.nrows(), expected],
            got: inputs.shape().to_vec(),
        })
    }
}

/// Adaptive average pooling of a `[C, H, W]` map down to `C` features
#[derive(Debug, Clone)]
pub struct GlobalAvgPool {
    channels: usize,
    spatial: usize,
}

impl GlobalAvgPool {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            spatial: height * width,
        }
    }
}

impl FeatureExtractor for GlobalAvgPool {
    fn extract_features(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        check_width(inputs, self.input_width())?;
        let batch = inputs.nrows();
        let pooled = inputs
            .to_shape((batch, self.channels, self.spatial))
            .map_err(|e| Error::Computation(format!("GlobalAvgPool reshape: {e}")))?
            .mean_axis(Axis(2))
            .unwrap_or_else(|| Array2::zeros((batch, self.channels)));
        Ok(pooled)
    }

    fn input_width(&self) -> usize {
        self.channels * self.spatial
    }

    fn output_width(&self) -> usize {
        self.channels
    }

    fn name(&self) -> &str {
        "GlobalAvgPool"
    }
}

/// Fixed linear map `x W^T` with `W` of shape `[out, in]`
#[derive(Debug, Clone)]
pub struct FrozenProjection {
    weight: [Tensor; 1],
}

impl FrozenProjection {
    pub const WEIGHT: &'static str = "extractor.weight";

    /// Uniform `[-1/sqrt(in), 1/sqrt(in)]` weights from a seeded RNG
    pub fn random(input_width: usize, output_width: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let bound = 1.0 / (input_width.max(1) as f32).sqrt();
        let data: Array1<f32> = (0..input_width * output_width)
            .map(|_| rng.random_range(-bound..=bound))
            .collect();
        Self::from_tensor(Tensor::new(
            Self::WEIGHT,
            vec![output_width, input_width],
            data,
            false,
        ))
    }

    /// Load the rank-2 tensor `tensor` from a SafeTensors (or JSON) file
    pub fn from_file(path: impl AsRef<Path>, tensor: &str) -> Result<Self> {
        let path = path.as_ref();
        let state = ModelState::load(path)?;
        let named = state.get(tensor).ok_or_else(|| {
            Error::Config(format!("{} has no tensor '{tensor}'", path.display()))
        })?;
        if named.shape.len() != 2 {
            return Err(Error::ShapeMismatch {
                expected: vec![0, 0],
                got: named.shape.clone(),
            });
        }
        Ok(Self::from_tensor(Tensor::new(
            Self::WEIGHT,
            named.shape.clone(),
            Array1::from(named.data.clone()),
            false,
        )))
    }

    fn from_tensor(weight: Tensor) -> Self {
        Self { weight: [weight] }
    }
}

impl FeatureExtractor for FrozenProjection {
    fn extract_features(&self, inputs: &Array2<f32>) -> Result<Array2<f32>> {
        check_width(inputs, self.input_width())?;
        Ok(inputs.dot(&self.weight[0].view2().t()))
    }

    fn input_width(&self) -> usize {
        self.weight[0].shape()[1]
    }

    fn output_width(&self) -> usize {
        self.weight[0].shape()[0]
    }

    fn frozen_parameters(&self) -> &[Tensor] {
        &self.weight
    }

    fn name(&self) -> &str {
        "FrozenProjection"
    }
}
