//! Run configuration

use crate::data::LoaderConfig;
use crate::precision::{Device, Precision};
use crate::{Error, Result};

/// Options for [`Trainer::fit`](super::Trainer::fit)
#[derive(Clone, Debug, PartialEq)]
pub struct FitConfig {
    /// Samples per training batch
    pub train_batch_size: usize,

    /// Samples per validation batch
    pub valid_batch_size: usize,

    /// Number of epochs to run (0 = return immediately)
    pub epochs: usize,

    pub device: Device,

    /// Precision of the forward pass; accumulation is always `f64`
    pub precision: Precision,

    /// Shuffle training samples every epoch
    pub shuffle: bool,

    /// Seed for shuffling; `None` draws from the thread RNG
    pub seed: Option<u64>,

    /// Drop the last short training batch
    pub drop_last: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            train_batch_size: 16,
            valid_batch_size: 32,
            epochs: 1,
            device: Device::Cpu,
            precision: Precision::Fp32,
            shuffle: true,
            seed: None,
            drop_last: false,
        }
    }
}

impl FitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_sizes(mut self, train: usize, valid: usize) -> Self {
        self.train_batch_size = train;
        self.valid_batch_size = valid;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Reject settings that cannot start a run
    pub fn validate(&self) -> Result<()> {
        if self.train_batch_size == 0 {
            return Err(Error::Config("train_batch_size must be > 0".to_string()));
        }
        if self.valid_batch_size == 0 {
            return Err(Error::Config("valid_batch_size must be > 0".to_string()));
        }
        self.device.ensure_available()
    }

    pub(crate) fn train_loader(&self) -> LoaderConfig {
        LoaderConfig::new(self.train_batch_size)
            .shuffle(self.shuffle)
            .drop_last(self.drop_last)
            .seed(self.seed)
    }

    pub(crate) fn valid_loader(&self) -> LoaderConfig {
        LoaderConfig::new(self.valid_batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = FitConfig::new()
            .with_batch_sizes(4, 8)
            .with_epochs(3)
            .with_precision(Precision::Bf16)
            .with_seed(7)
            .with_shuffle(false);
        assert_eq!(config.train_batch_size, 4);
        assert_eq!(config.valid_batch_size, 8);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.precision, Precision::Bf16);
        assert_eq!(config.seed, Some(7));
        assert!(!config.shuffle);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch_and_gpu() {
        assert!(FitConfig::new().with_batch_sizes(0, 1).validate().is_err());
        assert!(FitConfig::new().with_batch_sizes(1, 0).validate().is_err());
        let err = FitConfig::new()
            .with_device(Device::Cuda(0))
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }
}
