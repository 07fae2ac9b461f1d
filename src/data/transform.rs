//! Preprocessing and augmentation pipeline for `[C, H, W]` images
//!
//! Transforms draw randomness only from the RNG they are handed, which the
//! dataset seeds per `(seed, epoch, index)`.

use crate::{Error, Result};
use ndarray::{s, Array3, Axis};
use rand::rngs::StdRng;
use rand::Rng;

/// A transform applied to each image before batching.
pub trait Transform: Send + Sync {
    /// Apply the transform, returning the modified image.
    fn apply(&self, image: Array3<f32>, rng: &mut StdRng) -> Array3<f32>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// ImageNet channel statistics used by pretrained extractors
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Per-channel normalisation: `(x - mean * max_pixel) / (std * max_pixel)`
#[derive(Debug, Clone)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
    max_pixel_value: f32,
}

impl Normalize {
    /// Fails when `mean` and `std` are empty or differ in length, or when a
    /// divisor would be zero
    pub fn new(mean: Vec<f32>, std: Vec<f32>, max_pixel_value: f32) -> Result<Self> {
        if mean.is_empty() || mean.len() != std.len() {
            return Err(Error::Config(format!(
                "Normalize needs one mean and one std per channel, got {} and {}",
                mean.len(),
                std.len()
            )));
        }
        if max_pixel_value <= 0.0 || std.iter().any(|&s| s <= 0.0) {
            return Err(Error::Config(
                "Normalize std and max_pixel_value must be positive".to_string(),
            ));
        }
        Ok(Self {
            mean,
            std,
            max_pixel_value,
        })
    }

    /// ImageNet statistics for 8-bit pixel inputs
    pub fn imagenet() -> Self {
        Self {
            mean: IMAGENET_MEAN.to_vec(),
            std: IMAGENET_STD.to_vec(),
            max_pixel_value: 255.0,
        }
    }
}

impl Transform for Normalize {
    fn apply(&self, mut image: Array3<f32>, _rng: &mut StdRng) -> Array3<f32> {
        let channels = self.mean.len();
        for (c, mut plane) in image.axis_iter_mut(Axis(0)).enumerate() {
            // Channels beyond the configured statistics reuse the last entry
            let k = c.min(channels.saturating_sub(1));
            let (Some(&mean), Some(&std)) = (self.mean.get(k), self.std.get(k)) else {
                break;
            };
            let offset = mean * self.max_pixel_value;
            let scale = std * self.max_pixel_value;
            plane.mapv_inplace(|v| (v - offset) / scale);
        }
        image
    }

    fn name(&self) -> &str {
        "Normalize"
    }
}

/// Flip left-right with probability `p`
#[derive(Debug, Clone)]
pub struct HorizontalFlip {
    p: f64,
}

impl HorizontalFlip {
    pub fn new(p: f64) -> Self {
        Self { p: p.clamp(0.0, 1.0) }
    }
}

impl Transform for HorizontalFlip {
    fn apply(&self, image: Array3<f32>, rng: &mut StdRng) -> Array3<f32> {
        if rng.random_bool(self.p) {
            image.slice(s![.., .., ..;-1]).to_owned()
        } else {
            image
        }
    }

    fn name(&self) -> &str {
        "HorizontalFlip"
    }
}

/// Flip top-bottom with probability `p`
#[derive(Debug, Clone)]
pub struct VerticalFlip {
    p: f64,
}

impl VerticalFlip {
    pub fn new(p: f64) -> Self {
        Self { p: p.clamp(0.0, 1.0) }
    }
}

impl Transform for VerticalFlip {
    fn apply(&self, image: Array3<f32>, rng: &mut StdRng) -> Array3<f32> {
        if rng.random_bool(self.p) {
            image.slice(s![.., ..;-1, ..]).to_owned()
        } else {
            image
        }
    }

    fn name(&self) -> &str {
        "VerticalFlip"
    }
}

/// Swap the spatial axes with probability `p`
#[derive(Debug, Clone)]
pub struct Transpose {
    p: f64,
}

impl Transpose {
    pub fn new(p: f64) -> Self {
        Self { p: p.clamp(0.0, 1.0) }
    }
}

impl Transform for Transpose {
    fn apply(&self, image: Array3<f32>, rng: &mut StdRng) -> Array3<f32> {
        if rng.random_bool(self.p) {
            image
                .permuted_axes([0, 2, 1])
                .as_standard_layout()
                .into_owned()
        } else {
            image
        }
    }

    fn name(&self) -> &str {
        "Transpose"
    }
}

/// Chain multiple transforms.
pub struct Compose {
    transforms: Vec<Box<dyn Transform>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Transform>>) -> Self {
        Self { transforms }
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Names of the chained transforms, in application order
    pub fn names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }
}

impl Transform for Compose {
    fn apply(&self, mut image: Array3<f32>, rng: &mut StdRng) -> Array3<f32> {
        for t in &self.transforms {
            image = t.apply(image, rng);
        }
        image
    }

    fn name(&self) -> &str {
        "Compose"
    }
}

impl std::fmt::Debug for Compose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
