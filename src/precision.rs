//! Compute device and numeric precision selection

use crate::error::{Error, Result};
use half::{bf16, f16};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Device the run executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA device ordinal
    Cuda(usize),
}

impl Device {
    /// Whether this build can execute on the device
    pub fn is_available(&self) -> bool {
        matches!(self, Device::Cpu)
    }

    /// Fail with a configuration error if the device cannot be used
    pub fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "device {self} is not available (supported: cpu)"
            )))
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(0) => f.write_str("cuda"),
            Device::Cuda(n) => write!(f, "cuda:{n}"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            other => match other.strip_prefix("cuda:") {
                Some(ordinal) => ordinal
                    .parse()
                    .map(Device::Cuda)
                    .map_err(|_| format!("invalid CUDA ordinal in device '{s}'")),
                None => Err(format!(
                    "unknown device '{s}' (expected cpu, cuda or cuda:N)"
                )),
            },
        }
    }
}

impl TryFrom<String> for Device {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Device> for String {
    fn from(d: Device) -> Self {
        d.to_string()
    }
}

/// Numeric precision used inside the forward pass
///
/// Reduced modes round activations through the half-precision type; anything
/// reported to callbacks is accumulated in `f64` regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Fp32,
    Fp16,
    Bf16,
}

impl Precision {
    pub fn is_reduced(&self) -> bool {
        !matches!(self, Precision::Fp32)
    }

    /// Round a value to what the precision mode can represent
    pub fn round(&self, v: f32) -> f32 {
        match self {
            Precision::Fp32 => v,
            Precision::Fp16 => f16::from_f32(v).to_f32(),
            Precision::Bf16 => bf16::from_f32(v).to_f32(),
        }
    }

    /// Round every element of an activation matrix in place
    pub fn round_array(&self, a: &mut Array2<f32>) {
        if self.is_reduced() {
            a.mapv_inplace(|v| self.round(v));
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Fp32 => f.write_str("fp32"),
            Precision::Fp16 => f.write_str("fp16"),
            Precision::Bf16 => f.write_str("bf16"),
        }
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fp32" | "f32" | "full" => Ok(Precision::Fp32),
            "fp16" | "f16" | "half" => Ok(Precision::Fp16),
            "bf16" | "bfloat16" => Ok(Precision::Bf16),
            _ => Err(format!(
                "unknown precision '{s}' (expected fp32, fp16 or bf16)"
            )),
        }
    }
}
