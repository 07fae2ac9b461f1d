//! Run orchestration
//!
//! [`Trainer::fit`] drives the epoch loop: training batches with optimizer
//! steps, validation batches in eval mode, callback dispatch at every
//! lifecycle point, and per-epoch aggregation into a [`RunContext`].
//!
//! # Example
//!
//! ```no_run
//! use fitloop::callback::TrainingTime;
//! use fitloop::data::TensorDataset;
//! use fitloop::model::{GlobalAvgPool, ImageClassifier};
//! use fitloop::train::{FitConfig, Trainer};
//! use ndarray::Array2;
//!
//! let data = TensorDataset::new(Array2::zeros((4, 3)), vec![0, 1, 2, 0]).unwrap();
//! let model = ImageClassifier::new(Box::new(GlobalAvgPool::new(3, 1, 1)), 3, 42);
//! let config = FitConfig::new().with_batch_sizes(2, 4).with_epochs(2);
//!
//! let mut trainer = Trainer::new(Box::new(model), config);
//! trainer.add_callback(TrainingTime::new());
//! let ctx = trainer.fit(&data, None).unwrap();
//! assert_eq!(ctx.epochs_completed(), 2);
//! ```

mod config;
mod context;
mod trainer;

pub use config::FitConfig;
pub use context::{is_monitorable, EpochSummary, Phase, RunContext};
pub use trainer::Trainer;
