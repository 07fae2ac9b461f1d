//! Single-command experiments from YAML configuration

use super::builder::{build_callbacks, build_fit_config, build_model, build_transforms};
use super::schema::ExperimentSpec;
use super::validate::validate_config;
use crate::data::{ImageDataset, LabelEncoder, Manifest, ManifestConfig, RawTensorLoader};
use crate::error::{Error, Result};
use crate::model::{count_parameters, ParameterCount};
use crate::train::{RunContext, Trainer};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Load an experiment description from a YAML file and validate it
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<ExperimentSpec> {
    let path = config_path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    parse_config(&yaml)
}

/// Parse and validate an experiment description
pub fn parse_config(yaml: &str) -> Result<ExperimentSpec> {
    let spec: ExperimentSpec = serde_yaml::from_str(yaml)
        .map_err(|e| Error::Config(format!("Failed to parse YAML config: {e}")))?;
    validate_config(&spec).map_err(|e| Error::Config(format!("Invalid config: {e}")))?;
    Ok(spec)
}

/// Fail with a configuration error when an input path is missing
pub fn check_paths(spec: &ExperimentSpec) -> Result<()> {
    let required = [
        ("input_path", spec.input_path.clone()),
        ("manifest", spec.manifest_path()),
        ("image_dir", spec.image_root()),
    ];
    for (what, path) in required {
        if !path.exists() {
            return Err(Error::Config(format!(
                "{what} does not exist: {}",
                path.display()
            )));
        }
    }
    Ok(())
}

/// Outcome of [`run_experiment`]
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    /// Raw label of each class index
    pub classes: Vec<String>,
    pub train_samples: usize,
    pub valid_samples: usize,
    pub parameters: ParameterCount,
    /// Checkpoint path, if early stopping wrote one
    pub checkpoint: Option<PathBuf>,
    #[serde(skip)]
    pub context: RunContext,
}

/// Run a whole experiment
///
/// 1. Read the manifest and split it into train/valid
/// 2. Fit the label encoder on the training labels
/// 3. Build the datasets, the model and the callbacks
/// 4. Train, writing the best checkpoint to `<model_path>/<model_name>.bin`
pub fn run_experiment(spec: &ExperimentSpec) -> Result<ExperimentReport> {
    validate_config(spec).map_err(|e| Error::Config(format!("Invalid config: {e}")))?;
    check_paths(spec)?;
    let fit_config = build_fit_config(spec)?;
    fit_config.device.ensure_available()?;

    let manifest_config = ManifestConfig::default()
        .prefix(spec.image_root())
        .extension(spec.image_ext.clone())
        .limit(spec.limit);
    let manifest = Manifest::load(spec.manifest_path(), &manifest_config)?;
    let (train_rows, valid_rows) = manifest.split(spec.valid_fraction, spec.seed)?;
    let encoder = LabelEncoder::fit(train_rows.labels());
    info!(
        rows = manifest.len(),
        train = train_rows.len(),
        valid = valid_rows.len(),
        classes = encoder.num_classes(),
        "Loaded manifest {}",
        spec.manifest_path().display()
    );

    let train = ImageDataset::new(
        train_rows.samples(&encoder)?,
        RawTensorLoader::new(),
        spec.channels,
        spec.image_size,
    )
    .with_transform(build_transforms(&spec.augment, true)?)
    .with_seed(spec.seed)
    .with_name("train");
    let valid = ImageDataset::new(
        valid_rows.samples(&encoder)?,
        RawTensorLoader::new(),
        spec.channels,
        spec.image_size,
    )
    .with_transform(build_transforms(&spec.augment, false)?)
    .with_seed(spec.seed)
    .with_name("valid");

    let model = build_model(spec, encoder.num_classes())?;
    let parameters = count_parameters(&model);
    info!(
        total = parameters.total,
        trainable = parameters.trainable,
        "Model {} built",
        spec.model_name
    );

    let mut trainer = Trainer::new(Box::new(model), fit_config);
    for callback in build_callbacks(spec)? {
        trainer.add_callback(callback);
    }
    let context = trainer.fit(&train, Some(&valid))?;

    let checkpoint = spec.checkpoint_path();
    let checkpoint = if checkpoint.exists() {
        Some(checkpoint)
    } else {
        if context.epochs_completed() > 0 {
            warn!("No checkpoint written to {}", checkpoint.display());
        }
        None
    };

    Ok(ExperimentReport {
        classes: encoder.classes().to_vec(),
        train_samples: train.samples().len(),
        valid_samples: valid.samples().len(),
        parameters,
        checkpoint,
        context,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_valid_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"input_path: /data\nepochs: 4\n").unwrap();
        let spec = load_config(file.path()).unwrap();
        assert_eq!(spec.epochs, 4);
    }

    #[test]
    fn test_load_invalid_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"input_path: /data\ntrain_batch_size: 0\n")
            .unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(err.to_string().contains("train_batch_size"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_config("/nonexistent/experiment.yaml").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_parse_error_is_configuration() {
        assert!(parse_config("input_path: [unclosed").is_err());
        assert!(parse_config("epochs: 2\n").is_err());
    }

    #[test]
    fn test_missing_input_path_fails_before_run() {
        let spec = parse_config("input_path: /nonexistent/fitloop-data\n").unwrap();
        let err = run_experiment(&spec).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert!(err.to_string().contains("input_path"));
    }
}
