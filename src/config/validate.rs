//! Configuration validation

use super::schema::{ExperimentSpec, ExtractorSpec};
use crate::callback::MonitorMode;
use crate::precision::{Device, Precision};
use crate::train::is_monitorable;

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid {0}: 0 (must be > 0)")]
    ZeroSize(&'static str),

    #[error("Invalid device: {0}")]
    InvalidDevice(String),

    #[error("Invalid precision mode: {0}")]
    InvalidPrecision(String),

    #[error("Invalid monitor mode: {0} (must be min or max)")]
    InvalidMode(String),

    #[error("Invalid monitor: {0} (expected train_loss, valid_loss, train_<metric> or valid_<metric>)")]
    InvalidMonitor(String),

    #[error("Invalid valid_fraction: {0} (must be in (0, 1))")]
    InvalidValidFraction(f64),

    #[error("Invalid learning rate: {0} (must be > 0.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid {name}: {value} (must be in [0, 1))")]
    InvalidRate { name: &'static str, value: f32 },

    #[error("Invalid {name}: {value} (must be in [0, 1])")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("Invalid gradient clip value: {0} (must be > 0.0)")]
    InvalidGradClip(f32),

    #[error("Invalid delta: {0} (must be >= 0.0)")]
    InvalidDelta(f64),

    #[error("Invalid pruning amount: {0} (must be in [0, 1])")]
    InvalidPruneAmount(f32),

    #[error("Invalid normalisation: {0}")]
    InvalidNormalize(String),

    #[error("Unsupported image extension: {0} (expected f32, bin, u8 or raw)")]
    InvalidImageExt(String),
}

fn probability(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidProbability { name, value })
    }
}

fn rate(name: &'static str, value: f32) -> Result<(), ValidationError> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidRate { name, value })
    }
}

fn positive(name: &'static str, value: usize) -> Result<(), ValidationError> {
    if value == 0 {
        Err(ValidationError::ZeroSize(name))
    } else {
        Ok(())
    }
}

/// Validate an experiment description
///
/// Checks closed-value options (device, precision, mode, monitor), numeric
/// ranges and the normalisation statistics. Paths are checked when the
/// experiment runs. `epochs: 0` is accepted and runs nothing.
pub fn validate_config(spec: &ExperimentSpec) -> Result<(), ValidationError> {
    positive("train_batch_size", spec.train_batch_size)?;
    positive("valid_batch_size", spec.valid_batch_size)?;
    positive("image_size", spec.image_size)?;
    positive("channels", spec.channels)?;
    if let Some(limit) = spec.limit {
        positive("limit", limit)?;
    }

    spec.device
        .parse::<Device>()
        .map_err(ValidationError::InvalidDevice)?;
    spec.precision_mode
        .parse::<Precision>()
        .map_err(ValidationError::InvalidPrecision)?;
    spec.mode
        .parse::<MonitorMode>()
        .map_err(|_| ValidationError::InvalidMode(spec.mode.clone()))?;
    if !is_monitorable(&spec.monitor) {
        return Err(ValidationError::InvalidMonitor(spec.monitor.clone()));
    }

    if !(spec.valid_fraction > 0.0 && spec.valid_fraction < 1.0) {
        return Err(ValidationError::InvalidValidFraction(spec.valid_fraction));
    }
    if !(spec.learning_rate > 0.0) {
        return Err(ValidationError::InvalidLearningRate(spec.learning_rate));
    }
    rate("dropout", spec.dropout)?;
    rate("label_smoothing", spec.label_smoothing)?;
    if let Some(clip) = spec.grad_clip {
        if !(clip > 0.0) {
            return Err(ValidationError::InvalidGradClip(clip));
        }
    }
    if !(spec.delta >= 0.0) {
        return Err(ValidationError::InvalidDelta(spec.delta));
    }

    if let Some(pruning) = &spec.pruning {
        if !(0.0..=1.0).contains(&pruning.amount) {
            return Err(ValidationError::InvalidPruneAmount(pruning.amount));
        }
        positive("pruning.every", pruning.every)?;
    }

    if crate::data::RawEncoding::from_extension(&spec.image_ext).is_none() {
        return Err(ValidationError::InvalidImageExt(spec.image_ext.clone()));
    }

    let augment = &spec.augment;
    probability("augment.transpose", augment.transpose)?;
    probability("augment.horizontal_flip", augment.horizontal_flip)?;
    probability("augment.vertical_flip", augment.vertical_flip)?;
    if augment.normalize {
        if augment.mean.is_empty() || augment.mean.len() != augment.std.len() {
            return Err(ValidationError::InvalidNormalize(format!(
                "mean has {} entries, std has {}",
                augment.mean.len(),
                augment.std.len()
            )));
        }
        if augment.std.iter().any(|&s| !(s > 0.0)) || !(augment.max_pixel_value > 0.0) {
            return Err(ValidationError::InvalidNormalize(
                "std and max_pixel_value must be > 0".to_string(),
            ));
        }
    }

    if let ExtractorSpec::Projection { width, .. } = &spec.extractor {
        positive("extractor.width", *width)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PruningSpec;

    fn valid_spec() -> ExperimentSpec {
        serde_yaml::from_str("input_path: data\n").unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&valid_spec()), Ok(()));
    }

    #[test]
    fn test_zero_epochs_allowed() {
        let mut spec = valid_spec();
        spec.epochs = 0;
        assert!(validate_config(&spec).is_ok());
    }

    #[test]
    fn test_invalid_batch_size() {
        let mut spec = valid_spec();
        spec.valid_batch_size = 0;
        assert_eq!(
            validate_config(&spec),
            Err(ValidationError::ZeroSize("valid_batch_size"))
        );
    }

    #[test]
    fn test_closed_values() {
        let mut spec = valid_spec();
        spec.device = "tpu".into();
        assert!(matches!(
            validate_config(&spec),
            Err(ValidationError::InvalidDevice(_))
        ));

        let mut spec = valid_spec();
        spec.precision_mode = "int8".into();
        assert!(matches!(
            validate_config(&spec),
            Err(ValidationError::InvalidPrecision(_))
        ));

        let mut spec = valid_spec();
        spec.mode = "lowest".into();
        assert!(matches!(
            validate_config(&spec),
            Err(ValidationError::InvalidMode(_))
        ));

        let mut spec = valid_spec();
        spec.monitor = "loss".into();
        assert!(matches!(
            validate_config(&spec),
            Err(ValidationError::InvalidMonitor(_))
        ));
    }

    #[test]
    fn test_cuda_device_parses_even_if_unavailable() {
        let mut spec = valid_spec();
        spec.device = "cuda:0".into();
        assert!(validate_config(&spec).is_ok());
    }

    #[test]
    fn test_ranges() {
        let mut spec = valid_spec();
        spec.valid_fraction = 1.0;
        assert!(validate_config(&spec).is_err());

        let mut spec = valid_spec();
        spec.dropout = 1.0;
        assert!(validate_config(&spec).is_err());

        let mut spec = valid_spec();
        spec.grad_clip = Some(0.0);
        assert_eq!(
            validate_config(&spec),
            Err(ValidationError::InvalidGradClip(0.0))
        );

        let mut spec = valid_spec();
        spec.pruning = Some(PruningSpec {
            amount: 0.5,
            every: 0,
        });
        assert_eq!(
            validate_config(&spec),
            Err(ValidationError::ZeroSize("pruning.every"))
        );

        let mut spec = valid_spec();
        spec.augment.horizontal_flip = 1.5;
        assert!(validate_config(&spec).is_err());
    }

    #[test]
    fn test_normalize_lengths_must_match() {
        let mut spec = valid_spec();
        spec.augment.std = vec![0.5];
        assert!(matches!(
            validate_config(&spec),
            Err(ValidationError::InvalidNormalize(_))
        ));
        spec.augment.normalize = false;
        assert!(validate_config(&spec).is_ok());
    }

    #[test]
    fn test_image_ext() {
        let mut spec = valid_spec();
        spec.image_ext = "jpg".into();
        assert!(matches!(
            validate_config(&spec),
            Err(ValidationError::InvalidImageExt(_))
        ));
    }
}
