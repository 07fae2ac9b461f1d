//! # fitloop: image-classification experiments with a callback-driven fit loop
//!
//! fitloop wires a frozen feature extractor and a trainable classification
//! head into an epoch loop with lifecycle callbacks (early stopping with
//! checkpoint-on-improvement, gradient clipping, magnitude pruning, scalar
//! logging, loss plots, timing), driven from Rust or from a YAML experiment.
//!
//! ## Architecture
//!
//! - **data**: datasets, augmentation, manifests and batching
//! - **model**: the `Model` trait, extractors, classifier, losses, metrics
//! - **callback**: lifecycle hooks and the ordered registry
//! - **train**: `Trainer::fit` and the per-run `RunContext`
//! - **optim**: optimizers and gradient clipping
//! - **checkpoint**: model snapshots in SafeTensors or JSON
//! - **config**: declarative YAML experiments and the CLI
//! - **sink**: scalar metrics sinks

pub mod callback;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod optim;
pub mod precision;
pub mod sink;
pub mod tensor;
pub mod train;

// Re-export commonly used types
pub use error::{Error, ErrorKind, Result};
pub use precision::{Device, Precision};
pub use tensor::Tensor;
pub use train::{FitConfig, RunContext, Trainer};
