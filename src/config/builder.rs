//! Build experiment components from configuration

use super::schema::{AugmentSpec, ExperimentSpec, ExtractorSpec};
use crate::callback::{
    Callback, EarlyStopping, GradientClipping, MonitorMode, PlotLoss, Pruning, TensorBoardLogger,
    TrainingTime,
};
use crate::data::{Compose, HorizontalFlip, Normalize, Transform, Transpose, VerticalFlip};
use crate::error::{Error, Result};
use crate::model::{
    CrossEntropy, FeatureExtractor, FrozenProjection, GlobalAvgPool, ImageClassifier,
    LabelSmoothingCrossEntropy, LossFn,
};
use crate::precision::{Device, Precision};
use crate::train::FitConfig;

fn parse<T: std::str::FromStr<Err = String>>(value: &str) -> Result<T> {
    value.parse().map_err(Error::Config)
}

/// Augmentation pipeline; validation data only gets the normalisation
pub fn build_transforms(spec: &AugmentSpec, train: bool) -> Result<Compose> {
    let mut transforms: Vec<Box<dyn Transform>> = Vec::new();
    if train {
        if spec.transpose > 0.0 {
            transforms.push(Box::new(Transpose::new(spec.transpose)));
        }
        if spec.horizontal_flip > 0.0 {
            transforms.push(Box::new(HorizontalFlip::new(spec.horizontal_flip)));
        }
        if spec.vertical_flip > 0.0 {
            transforms.push(Box::new(VerticalFlip::new(spec.vertical_flip)));
        }
    }
    if spec.normalize {
        transforms.push(Box::new(Normalize::new(
            spec.mean.clone(),
            spec.std.clone(),
            spec.max_pixel_value,
        )?));
    }
    Ok(Compose::new(transforms))
}

/// Feature extractor for `[channels, image_size, image_size]` inputs
pub fn build_extractor(spec: &ExperimentSpec) -> Result<Box<dyn FeatureExtractor>> {
    let input_width = spec.channels * spec.image_size * spec.image_size;
    match &spec.extractor {
        ExtractorSpec::AvgPool => Ok(Box::new(GlobalAvgPool::new(
            spec.channels,
            spec.image_size,
            spec.image_size,
        ))),
        ExtractorSpec::Projection {
            width,
            weights: None,
            ..
        } => Ok(Box::new(FrozenProjection::random(
            input_width,
            *width,
            spec.seed,
        ))),
        ExtractorSpec::Projection {
            width,
            weights: Some(path),
            tensor,
        } => {
            let projection = FrozenProjection::from_file(path, tensor)?;
            if projection.input_width() != input_width || projection.output_width() != *width {
                return Err(Error::Config(format!(
                    "extractor weights in {} map {} -> {}, expected {} -> {}",
                    path.display(),
                    projection.input_width(),
                    projection.output_width(),
                    input_width,
                    width
                )));
            }
            Ok(Box::new(projection))
        }
    }
}

/// Classifier with the configured extractor, dropout, loss and learning rate
pub fn build_model(spec: &ExperimentSpec, num_classes: usize) -> Result<ImageClassifier> {
    if num_classes == 0 {
        return Err(Error::Config("manifest has no labels".to_string()));
    }
    let loss: Box<dyn LossFn> = if spec.label_smoothing > 0.0 {
        Box::new(LabelSmoothingCrossEntropy::new(spec.label_smoothing))
    } else {
        Box::new(CrossEntropy)
    };
    Ok(
        ImageClassifier::new(build_extractor(spec)?, num_classes, spec.seed)
            .with_name(spec.model_name.clone())
            .with_dropout(spec.dropout)
            .with_loss(loss)
            .with_learning_rate(spec.learning_rate),
    )
}

/// Callbacks in dispatch order
///
/// Clipping, scalar logging, pruning and timing first, then early stopping
/// so that the checkpoint holds the pruned weights, then the loss plot.
pub fn build_callbacks(spec: &ExperimentSpec) -> Result<Vec<Callback>> {
    let mut callbacks: Vec<Callback> = Vec::new();
    if let Some(max_norm) = spec.grad_clip {
        callbacks.push(GradientClipping::new(max_norm).into());
    }
    if let Some(dir) = &spec.log_dir {
        callbacks.push(TensorBoardLogger::new(dir)?.into());
    }
    if let Some(pruning) = &spec.pruning {
        callbacks.push(Pruning::new(pruning.amount).every(pruning.every).into());
    }
    callbacks.push(TrainingTime::new().into());

    let mode: MonitorMode = parse(&spec.mode)?;
    callbacks.push(
        EarlyStopping::new(spec.monitor.clone(), mode, spec.patience)
            .with_delta(spec.delta)
            .with_model_path(spec.checkpoint_path())
            .into(),
    );
    if spec.plot_loss {
        callbacks.push(PlotLoss::new().with_csv(spec.loss_csv_path()).into());
    }
    Ok(callbacks)
}

/// Run settings for [`Trainer::fit`](crate::train::Trainer::fit)
pub fn build_fit_config(spec: &ExperimentSpec) -> Result<FitConfig> {
    let device: Device = parse(&spec.device)?;
    let precision: Precision = parse(&spec.precision_mode)?;
    Ok(FitConfig::new()
        .with_batch_sizes(spec.train_batch_size, spec.valid_batch_size)
        .with_epochs(spec.epochs)
        .with_device(device)
        .with_precision(precision)
        .with_shuffle(true)
        .with_seed(spec.seed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::ModelState;
    use crate::model::Model;
    use crate::Tensor;
    use ndarray::Array1;
    use tempfile::TempDir;

    fn spec(yaml: &str) -> ExperimentSpec {
        serde_yaml::from_str(&format!("input_path: data\nimage_size: 4\n{yaml}")).unwrap()
    }

    #[test]
    fn test_transforms_train_vs_valid() {
        let augment = AugmentSpec::default();
        assert_eq!(
            build_transforms(&augment, true).unwrap().names(),
            vec!["Transpose", "HorizontalFlip", "VerticalFlip", "Normalize"]
        );
        assert_eq!(build_transforms(&augment, false).unwrap().names(), vec!["Normalize"]);
    }

    #[test]
    fn test_transforms_skip_disabled() {
        let augment = AugmentSpec {
            transpose: 0.0,
            normalize: false,
            ..AugmentSpec::default()
        };
        assert_eq!(
            build_transforms(&augment, true).unwrap().names(),
            vec!["HorizontalFlip", "VerticalFlip"]
        );
        assert!(build_transforms(&augment, false).unwrap().is_empty());
    }

    #[test]
    fn test_build_model_widths() {
        let model = build_model(&spec(""), 5).unwrap();
        assert_eq!(model.extractor().input_width(), 3 * 4 * 4);
        assert_eq!(model.extractor().output_width(), 3);
        assert_eq!(model.parameters()[0].shape(), &[5, 3]);
        assert_eq!(model.name(), "blindness");

        let model = build_model(&spec("extractor:\n  kind: projection\n  width: 8\n"), 2).unwrap();
        assert_eq!(model.extractor().output_width(), 8);
        assert_eq!(model.frozen_parameters().len(), 1);
    }

    #[test]
    fn test_build_model_rejects_mismatched_weights() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("extractor.safetensors");
        let weight = Tensor::new(
            FrozenProjection::WEIGHT,
            vec![2, 5],
            Array1::zeros(10),
            false,
        );
        ModelState::capture("extractor", [&weight]).save(&path).unwrap();

        let yaml = format!(
            "extractor:\n  kind: projection\n  width: 2\n  weights: {}\n",
            path.display()
        );
        let err = build_model(&spec(&yaml), 2).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn test_build_callbacks_order() {
        let dir = TempDir::new().unwrap();
        let yaml = format!(
            "grad_clip: 5.0\npruning:\n  amount: 0.1\nlog_dir: {}\nplot_loss: true\n",
            dir.path().display()
        );
        let callbacks = build_callbacks(&spec(&yaml)).unwrap();
        let names: Vec<&str> = callbacks.iter().map(Callback::name).collect();
        assert_eq!(
            names,
            vec![
                "GradientClipping",
                "TensorBoardLogger",
                "Pruning",
                "TrainingTime",
                "EarlyStopping",
                "PlotLoss"
            ]
        );

        let minimal = build_callbacks(&spec("")).unwrap();
        assert_eq!(minimal.len(), 2);
    }

    #[test]
    fn test_build_fit_config() {
        let config = build_fit_config(&spec("precision_mode: bf16\nseed: 9\n")).unwrap();
        assert_eq!(config.precision, Precision::Bf16);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.train_batch_size, 64);
    }
}
