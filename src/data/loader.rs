//! Batching and per-epoch iteration order

use super::dataset::{Dataset, Example};
use crate::error::{Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// A collated group of examples, owned by a single training step
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `[batch, features]` inputs
    pub inputs: Array2<f32>,
    /// Encoded class labels, one per row
    pub labels: Vec<usize>,
    /// Dataset indices the rows came from
    pub indices: Vec<usize>,
}

impl Batch {
    /// Stack examples into a batch
    pub fn collate(examples: Vec<Example>, indices: Vec<usize>) -> Result<Self> {
        let rows = examples.len();
        let cols = examples.first().map(|e| e.input.len()).unwrap_or(0);

        let mut data = Vec::with_capacity(rows * cols);
        let mut labels = Vec::with_capacity(rows);
        for (example, &index) in examples.into_iter().zip(&indices) {
            if example.input.len() != cols {
                return Err(Error::data(
                    index,
                    format!(
                        "input has {} values, batch expects {cols}",
                        example.input.len()
                    ),
                ));
            }
            data.extend(example.input.iter().copied());
            labels.push(example.label);
        }

        let inputs = Array2::from_shape_vec((rows, cols), data).map_err(|_| {
            Error::ShapeMismatch {
                expected: vec![rows, cols],
                got: vec![labels.len()],
            }
        })?;

        Ok(Self {
            inputs,
            labels,
            indices,
        })
    }

    /// Number of examples in the batch
    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Iteration policy for a [`BatchLoader`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Whether to shuffle indices each epoch.
    pub shuffle: bool,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
    /// Seed for reproducible shuffling; `None` draws from the thread RNG.
    pub seed: Option<u64>,
}

impl LoaderConfig {
    /// Sequential, non-shuffled batches of `batch_size`
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            shuffle: false,
            drop_last: false,
            seed: None,
        }
    }

    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Produces the batches of one dataset, epoch by epoch
pub struct BatchLoader<'a> {
    dataset: &'a dyn Dataset,
    config: LoaderConfig,
}

impl<'a> BatchLoader<'a> {
    pub fn new(dataset: &'a dyn Dataset, config: LoaderConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(Error::Config("batch size must be > 0".to_string()));
        }
        Ok(Self { dataset, config })
    }

    /// The number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        if self.config.drop_last {
            self.dataset.len() / self.config.batch_size
        } else {
            self.dataset.len().div_ceil(self.config.batch_size)
        }
    }

    /// Sample order for an epoch; stable for the whole epoch
    pub fn order(&self, epoch: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.config.shuffle {
            match self.config.seed {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
                    indices.shuffle(&mut rng);
                }
                None => indices.shuffle(&mut rand::rng()),
            }
        }
        indices
    }

    /// Lazily iterate the batches of one epoch
    pub fn epoch(&self, epoch: usize) -> EpochBatches<'_, 'a> {
        let mut order = self.order(epoch);
        if self.config.drop_last {
            order.truncate(self.num_batches() * self.config.batch_size);
        }
        EpochBatches {
            loader: self,
            order,
            cursor: 0,
            epoch,
        }
    }
}

/// Iterator over the batches of a single epoch
pub struct EpochBatches<'l, 'a> {
    loader: &'l BatchLoader<'a>,
    order: Vec<usize>,
    cursor: usize,
    epoch: usize,
}

impl Iterator for EpochBatches<'_, '_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.config.batch_size).min(self.order.len());
        let indices = self.order[self.cursor..end].to_vec();
        self.cursor = end;

        let examples: Result<Vec<Example>> = indices
            .iter()
            .map(|&i| self.loader.dataset.get_for_epoch(i, self.epoch))
            .collect();
        Some(examples.and_then(|ex| Batch::collate(ex, indices)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.order.len() - self.cursor).div_ceil(self.loader.config.batch_size);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TensorDataset;
    use ndarray::Array2;

    fn dataset(n: usize) -> TensorDataset {
        let inputs = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f32);
        TensorDataset::new(inputs, (0..n).map(|i| i % 3).collect()).unwrap()
    }

    #[test]
    fn test_partition_ten_by_four() {
        let ds = dataset(10);
        let loader = BatchLoader::new(&ds, LoaderConfig::new(4)).unwrap();
        assert_eq!(loader.num_batches(), 3);

        let sizes: Vec<usize> = loader.epoch(0).map(|b| b.unwrap().size()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn test_drop_last() {
        let ds = dataset(10);
        let loader = BatchLoader::new(&ds, LoaderConfig::new(4).drop_last(true)).unwrap();
        assert_eq!(loader.num_batches(), 2);
        assert_eq!(loader.epoch(0).count(), 2);
    }

    #[test]
    fn test_sequential_order_and_collation() {
        let ds = dataset(3);
        let loader = BatchLoader::new(&ds, LoaderConfig::new(2)).unwrap();
        let batches: Vec<Batch> = loader.epoch(0).map(|b| b.unwrap()).collect();

        assert_eq!(batches[0].indices, vec![0, 1]);
        assert_eq!(batches[0].inputs.row(1).to_vec(), vec![2.0, 3.0]);
        assert_eq!(batches[0].labels, vec![0, 1]);
        assert_eq!(batches[1].indices, vec![2]);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible_per_epoch() {
        let ds = dataset(20);
        let config = LoaderConfig::new(5).shuffle(true).seed(Some(3));
        let loader = BatchLoader::new(&ds, config).unwrap();

        assert_eq!(loader.order(0), loader.order(0));
        assert_ne!(loader.order(0), loader.order(1));

        let mut seen = loader.order(1);
        seen.sort_unstable();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let ds = dataset(3);
        assert!(BatchLoader::new(&ds, LoaderConfig::new(0)).is_err());
    }

    #[test]
    fn test_empty_dataset_has_no_batches() {
        let ds = dataset(0);
        let loader = BatchLoader::new(&ds, LoaderConfig::new(4)).unwrap();
        assert_eq!(loader.num_batches(), 0);
        assert!(loader.epoch(0).next().is_none());
    }

    #[test]
    fn test_size_hint() {
        let ds = dataset(10);
        let loader = BatchLoader::new(&ds, LoaderConfig::new(4)).unwrap();
        let mut it = loader.epoch(0);
        assert_eq!(it.size_hint(), (3, Some(3)));
        it.next();
        assert_eq!(it.size_hint(), (2, Some(2)));
    }
}
