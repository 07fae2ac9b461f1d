//! Optimizers for training the classification head

mod adamw;
mod clip;
mod optimizer;
mod sgd;

pub use adamw::AdamW;
pub use clip::{clip_grad_norm, global_grad_norm};
pub use optimizer::Optimizer;
pub use sgd::SGD;
