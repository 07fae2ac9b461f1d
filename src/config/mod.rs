//! Declarative YAML experiment configuration
//!
//! # Example
//!
//! ```yaml
//! input_path: /data/blindness
//! model_path: ./models
//! model_name: blindness
//! train_batch_size: 64
//! valid_batch_size: 64
//! image_size: 192
//! epochs: 2
//! device: cpu
//! precision_mode: fp16
//! patience: 3
//! grad_clip: 5.0
//! pruning:
//!   amount: 0.2
//! ```

mod builder;
mod cli;
mod experiment;
mod schema;
mod validate;

pub use builder::{build_callbacks, build_extractor, build_fit_config, build_model, build_transforms};
pub use cli::{apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, TrainArgs, ValidateArgs};
pub use experiment::{check_paths, load_config, parse_config, run_experiment, ExperimentReport};
pub use schema::{AugmentSpec, ExperimentSpec, ExtractorSpec, PruningSpec};
pub use validate::{validate_config, ValidationError};
