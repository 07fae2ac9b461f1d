//! YAML schema of an experiment description

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete experiment description
///
/// Only `input_path` is required; everything else has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentSpec {
    /// Dataset root holding the manifest and the image directory
    pub input_path: PathBuf,

    /// Directory the best checkpoint is written to
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Model name; the checkpoint is `<model_path>/<model_name>.bin`
    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_batch_size")]
    pub train_batch_size: usize,

    #[serde(default = "default_batch_size")]
    pub valid_batch_size: usize,

    /// Images are `image_size x image_size` with `channels` channels
    #[serde(default = "default_image_size")]
    pub image_size: usize,

    #[serde(default = "default_channels")]
    pub channels: usize,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// "cpu", "cuda" or "cuda:N"
    #[serde(default = "default_device")]
    pub device: String,

    /// "fp32", "fp16" or "bf16"
    #[serde(default = "default_precision")]
    pub precision_mode: String,

    /// Early-stopping patience in epochs
    #[serde(default = "default_patience")]
    pub patience: usize,

    /// Manifest CSV, relative to `input_path`
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,

    /// Image directory, relative to `input_path`
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Extension of the raw image files
    #[serde(default = "default_image_ext")]
    pub image_ext: String,

    /// Use only the first `limit` manifest rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default = "default_valid_fraction")]
    pub valid_fraction: f64,

    /// Seed for the split, shuffling, augmentation and initialisation
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    #[serde(default = "default_dropout")]
    pub dropout: f32,

    /// 0 selects plain cross-entropy
    #[serde(default = "default_label_smoothing")]
    pub label_smoothing: f32,

    /// Maximum global gradient norm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grad_clip: Option<f32>,

    /// Quantity watched by early stopping
    #[serde(default = "default_monitor")]
    pub monitor: String,

    /// "min" or "max"
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Minimum change that counts as an improvement
    #[serde(default)]
    pub delta: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pruning: Option<PruningSpec>,

    /// Directory for `scalars.jsonl`; no scalar log when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Log a loss chart per epoch and write `<model_name>_loss.csv`
    #[serde(default)]
    pub plot_loss: bool,

    #[serde(default)]
    pub augment: AugmentSpec,

    #[serde(default)]
    pub extractor: ExtractorSpec,
}

/// Magnitude pruning settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PruningSpec {
    /// Fraction of each weight matrix to zero
    #[serde(default = "default_prune_amount")]
    pub amount: f32,

    /// Prune every N epochs
    #[serde(default = "default_one")]
    pub every: usize,
}

/// Training-time augmentation; validation only normalises
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AugmentSpec {
    #[serde(default = "default_flip_p")]
    pub transpose: f64,

    #[serde(default = "default_flip_p")]
    pub horizontal_flip: f64,

    #[serde(default = "default_flip_p")]
    pub vertical_flip: f64,

    #[serde(default = "default_true")]
    pub normalize: bool,

    #[serde(default = "default_mean")]
    pub mean: Vec<f32>,

    #[serde(default = "default_std")]
    pub std: Vec<f32>,

    #[serde(default = "default_max_pixel")]
    pub max_pixel_value: f32,
}

impl Default for AugmentSpec {
    fn default() -> Self {
        Self {
            transpose: default_flip_p(),
            horizontal_flip: default_flip_p(),
            vertical_flip: default_flip_p(),
            normalize: true,
            mean: default_mean(),
            std: default_std(),
            max_pixel_value: default_max_pixel(),
        }
    }
}

/// Feature extractor in front of the classification head
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractorSpec {
    /// Average each channel; features = channels
    #[default]
    AvgPool,
    /// Frozen linear map of the flattened image
    Projection {
        width: usize,
        /// SafeTensors/JSON file with the weights; random when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        weights: Option<PathBuf>,
        #[serde(default = "default_projection_tensor")]
        tensor: String,
    },
}

impl ExperimentSpec {
    /// Path the early-stopping checkpoint is written to
    pub fn checkpoint_path(&self) -> PathBuf {
        self.model_path.join(format!("{}.bin", self.model_name))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.input_path.join(&self.manifest)
    }

    pub fn image_root(&self) -> PathBuf {
        self.input_path.join(&self.image_dir)
    }

    pub fn loss_csv_path(&self) -> PathBuf {
        self.model_path.join(format!("{}_loss.csv", self.model_name))
    }
}

fn default_true() -> bool {
    true
}

fn default_one() -> usize {
    1
}

fn default_model_path() -> PathBuf {
    PathBuf::from("./models")
}

fn default_model_name() -> String {
    "blindness".to_string()
}

fn default_batch_size() -> usize {
    64
}

fn default_image_size() -> usize {
    192
}

fn default_channels() -> usize {
    3
}

fn default_epochs() -> usize {
    2
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_precision() -> String {
    "fp32".to_string()
}

fn default_patience() -> usize {
    3
}

fn default_manifest() -> PathBuf {
    PathBuf::from("trainLabels.csv")
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("trainImages")
}

fn default_image_ext() -> String {
    "u8".to_string()
}

fn default_valid_fraction() -> f64 {
    0.33
}

fn default_seed() -> u64 {
    42
}

fn default_learning_rate() -> f32 {
    crate::model::DEFAULT_LEARNING_RATE
}

fn default_dropout() -> f32 {
    0.1
}

fn default_label_smoothing() -> f32 {
    0.1
}

fn default_monitor() -> String {
    "valid_loss".to_string()
}

fn default_mode() -> String {
    "min".to_string()
}

fn default_prune_amount() -> f32 {
    0.2
}

fn default_flip_p() -> f64 {
    0.5
}

fn default_mean() -> Vec<f32> {
    crate::data::transform::IMAGENET_MEAN.to_vec()
}

fn default_std() -> Vec<f32> {
    crate::data::transform::IMAGENET_STD.to_vec()
}

fn default_max_pixel() -> f32 {
    255.0
}

fn default_projection_tensor() -> String {
    crate::model::FrozenProjection::WEIGHT.to_string()
}
