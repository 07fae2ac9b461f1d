//! Dataset trait and the adapters that implement it

use super::source::{SampleLoader, SampleRef};
use super::transform::{Compose, Transform};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Array3};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// A raw sample: where to find the input, and its encoded class label
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub reference: SampleRef,
    pub label: usize,
}

impl Sample {
    pub fn new(reference: impl Into<SampleRef>, label: usize) -> Self {
        Self {
            reference: reference.into(),
            label,
        }
    }
}

/// A processed sample ready for collation
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    /// Flattened input in `[C, H, W]` order
    pub input: Array1<f32>,
    pub label: usize,
}

/// Ordered, finite, re-iterable collection of examples
///
/// `get` must succeed for every index in `[0, len)` whose underlying sample
/// is well formed, and fail with [`Error::IndexOutOfRange`] otherwise.
pub trait Dataset {
    /// Total number of samples in the dataset.
    fn len(&self) -> usize;

    /// Whether the dataset is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retrieve the example at `index`, as seen in epoch 0.
    fn get(&self, index: usize) -> Result<Example> {
        self.get_for_epoch(index, 0)
    }

    /// Retrieve the example at `index` for a given epoch.
    ///
    /// Random transforms are a pure function of `(seed, epoch, index)`.
    fn get_for_epoch(&self, index: usize, epoch: usize) -> Result<Example>;

    /// Shape of a single input (without batch dim).
    fn input_shape(&self) -> &[usize];

    /// Optional human-readable name.
    fn name(&self) -> &str {
        "dataset"
    }
}

pub(crate) fn check_index(index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(Error::IndexOutOfRange { index, len })
    }
}

/// Per-sample RNG seed derived from the dataset seed, epoch and index
fn sample_seed(seed: u64, epoch: usize, index: usize) -> u64 {
    // splitmix64 finalizer over the combined key
    let mut z = seed
        ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (index as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// =============================================================================
// Image dataset
// =============================================================================

/// Maps `(reference, label)` pairs to processed `[C, H, W]` inputs
///
/// The loader reads the raw values; the optional pipeline is applied with an
/// RNG seeded from `(seed, epoch, index)`, so the same call always yields the
/// same example.
pub struct ImageDataset<L: SampleLoader> {
    samples: Vec<Sample>,
    loader: L,
    transform: Option<Compose>,
    shape: Vec<usize>,
    seed: u64,
    name: String,
}

impl<L: SampleLoader> ImageDataset<L> {
    /// Create a dataset of `channels x size x size` images
    pub fn new(samples: Vec<Sample>, loader: L, channels: usize, image_size: usize) -> Self {
        Self {
            samples,
            loader,
            transform: None,
            shape: vec![channels, image_size, image_size],
            seed: 0,
            name: "images".to_string(),
        }
    }

    /// Attach an augmentation / preprocessing pipeline
    pub fn with_transform(mut self, transform: Compose) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl<L: SampleLoader> Dataset for ImageDataset<L> {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get_for_epoch(&self, index: usize, epoch: usize) -> Result<Example> {
        check_index(index, self.samples.len())?;
        let sample = &self.samples[index];

        let raw = self
            .loader
            .load(&sample.reference)
            .map_err(|e| Error::data(index, format!("{}: {e}", sample.reference)))?;

        let (c, h, w) = (self.shape[0], self.shape[1], self.shape[2]);
        let image = Array3::from_shape_vec((c, h, w), raw).map_err(|e| {
            Error::data(
                index,
                format!(
                    "{} does not hold a {c}x{h}x{w} image: {e}",
                    sample.reference
                ),
            )
        })?;

        let image = match &self.transform {
            Some(pipeline) => {
                let mut rng = StdRng::seed_from_u64(sample_seed(self.seed, epoch, index));
                pipeline.apply(image, &mut rng)
            }
            None => image,
        };

        Ok(Example {
            input: image.iter().copied().collect(),
            label: sample.label,
        })
    }

    fn input_shape(&self) -> &[usize] {
        &self.shape
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// =============================================================================
// In-memory dataset
// =============================================================================

/// Dataset over rows of an in-memory matrix
#[derive(Debug, Clone)]
pub struct TensorDataset {
    inputs: Array2<f32>,
    labels: Vec<usize>,
    shape: Vec<usize>,
}

impl TensorDataset {
    /// Create from a `[n, features]` matrix and `n` labels
    pub fn new(inputs: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if inputs.nrows() != labels.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![inputs.nrows()],
                got: vec![labels.len()],
            });
        }
        let shape = vec![inputs.ncols()];
        Ok(Self {
            inputs,
            labels,
            shape,
        })
    }

    /// Declare the per-sample shape (e.g. `[C, H, W]`) the rows represent
    pub fn with_input_shape(mut self, shape: Vec<usize>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != self.inputs.ncols() {
            return Err(Error::ShapeMismatch {
                expected: vec![self.inputs.ncols()],
                got: shape,
            });
        }
        self.shape = shape;
        Ok(self)
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }
}

impl Dataset for TensorDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn get_for_epoch(&self, index: usize, _epoch: usize) -> Result<Example> {
        check_index(index, self.labels.len())?;
        Ok(Example {
            input: self.inputs.row(index).to_owned(),
            label: self.labels[index],
        })
    }

    fn input_shape(&self) -> &[usize] {
        &self.shape
    }

    fn name(&self) -> &str {
        "tensors"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::transform::HorizontalFlip;
    use crate::ErrorKind;
    use ndarray::array;
    use std::collections::HashMap;

    /// Loader serving fixed vectors keyed by index
    struct MapLoader(HashMap<usize, Vec<f32>>);

    impl SampleLoader for MapLoader {
        fn load(&self, reference: &SampleRef) -> Result<Vec<f32>> {
            match reference {
                SampleRef::Index(i) => self
                    .0
                    .get(i)
                    .cloned()
                    .ok_or_else(|| Error::Config(format!("no sample {i}"))),
                SampleRef::Path(p) => Err(Error::Config(format!("unexpected path {p:?}"))),
            }
        }
    }

    fn two_by_two_images() -> ImageDataset<MapLoader> {
        let mut data = HashMap::new();
        data.insert(0, vec![1.0, 2.0, 3.0, 4.0]);
        data.insert(1, vec![5.0, 6.0, 7.0, 8.0]);
        data.insert(2, vec![1.0, 2.0]); // wrong size
        let samples = vec![Sample::new(0, 0), Sample::new(1, 1), Sample::new(2, 0)];
        ImageDataset::new(samples, MapLoader(data), 1, 2)
    }

    #[test]
    fn test_image_dataset_get() {
        let ds = two_by_two_images();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.input_shape(), &[1, 2, 2]);

        let ex = ds.get(1).unwrap();
        assert_eq!(ex.label, 1);
        assert_eq!(ex.input.to_vec(), vec![5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_image_dataset_out_of_range() {
        let ds = two_by_two_images();
        let err = ds.get(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Index);
    }

    #[test]
    fn test_image_dataset_malformed_sample_is_data_error() {
        let ds = two_by_two_images();
        let err = ds.get(2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(matches!(err, Error::Data { index: 2, .. }));
    }

    #[test]
    fn test_image_dataset_transform_is_deterministic_per_epoch() {
        let ds = two_by_two_images()
            .with_transform(Compose::new(vec![Box::new(HorizontalFlip::new(0.5))]))
            .with_seed(7);

        for epoch in 0..4 {
            let a = ds.get_for_epoch(0, epoch).unwrap();
            let b = ds.get_for_epoch(0, epoch).unwrap();
            assert_eq!(a, b);
        }
        assert_eq!(ds.get(0).unwrap(), ds.get_for_epoch(0, 0).unwrap());
    }

    #[test]
    fn test_sample_seed_varies() {
        assert_ne!(sample_seed(1, 0, 0), sample_seed(1, 0, 1));
        assert_ne!(sample_seed(1, 0, 0), sample_seed(1, 1, 0));
        assert_ne!(sample_seed(1, 0, 0), sample_seed(2, 0, 0));
    }

    #[test]
    fn test_tensor_dataset() {
        let ds = TensorDataset::new(array![[1.0, 2.0], [3.0, 4.0]], vec![0, 1]).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().input.to_vec(), vec![3.0, 4.0]);
        assert!(ds.get(2).is_err());
    }

    #[test]
    fn test_tensor_dataset_label_mismatch() {
        let err = TensorDataset::new(array![[1.0, 2.0]], vec![0, 1]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_tensor_dataset_input_shape() {
        let ds = TensorDataset::new(Array2::zeros((1, 12)), vec![0])
            .unwrap()
            .with_input_shape(vec![3, 2, 2])
            .unwrap();
        assert_eq!(ds.input_shape(), &[3, 2, 2]);
        let bad = TensorDataset::new(Array2::zeros((1, 12)), vec![0])
            .unwrap()
            .with_input_shape(vec![3, 3, 3]);
        assert!(bad.is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// get(i) succeeds exactly for i in [0, len)
        #[test]
        fn get_succeeds_only_in_range(len in 0usize..40, index in 0usize..80) {
            let ds = TensorDataset::new(Array2::zeros((len, 3)), vec![0; len]).unwrap();
            let result = ds.get(index);
            if index < len {
                prop_assert!(result.is_ok());
            } else {
                let out_of_range = matches!(result, Err(Error::IndexOutOfRange { .. }));
                prop_assert!(out_of_range);
            }
        }
    }
}
