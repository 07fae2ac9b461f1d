//! Datasets, sample loading, augmentation and batching

mod dataset;
mod loader;
mod manifest;
mod source;
pub mod transform;

pub use dataset::{Dataset, Example, ImageDataset, Sample, TensorDataset};
pub use loader::{Batch, BatchLoader, EpochBatches, LoaderConfig};
pub use manifest::{LabelEncoder, Manifest, ManifestConfig, ManifestEntry};
pub use source::{write_raw_f32, RawEncoding, RawTensorLoader, SampleLoader, SampleRef};
pub use transform::{Compose, HorizontalFlip, Normalize, Transform, Transpose, VerticalFlip};
