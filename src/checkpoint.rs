//! Model checkpoints: snapshot, save and load
//!
//! The format is picked from the file extension: `.json` writes a
//! human-readable JSON document, anything else writes SafeTensors.

use crate::{Error, Result, Tensor};
use safetensors::tensor::{Dtype, TensorView};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// Serialization format of a checkpoint file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointFormat {
    /// SafeTensors (HuggingFace compatible, binary)
    SafeTensors,
    /// JSON (human-readable, larger)
    Json,
}

impl CheckpointFormat {
    /// Detect the format from a path; unknown extensions use SafeTensors
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("json") => CheckpointFormat::Json,
            _ => CheckpointFormat::SafeTensors,
        }
    }
}

/// One named parameter in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

/// Serializable snapshot of a model's parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub model_name: String,
    pub tensors: Vec<NamedTensor>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ModelState {
    /// Snapshot the given parameters
    pub fn capture<'a>(model_name: &str, params: impl IntoIterator<Item = &'a Tensor>) -> Self {
        let tensors = params
            .into_iter()
            .map(|t| NamedTensor {
                name: t.name().to_string(),
                shape: t.shape().to_vec(),
                data: t.data().to_vec(),
            })
            .collect();
        Self {
            model_name: model_name.to_string(),
            tensors,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&NamedTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// Total number of scalar values in the snapshot
    pub fn num_values(&self) -> usize {
        self.tensors.iter().map(|t| t.data.len()).sum()
    }

    /// Write the snapshot to `path`, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        match CheckpointFormat::from_path(path) {
            CheckpointFormat::Json => {
                let data = serde_json::to_string_pretty(self)
                    .map_err(|e| Error::Serialization(format!("JSON serialization failed: {e}")))?;
                fs::write(path, data)?;
            }
            CheckpointFormat::SafeTensors => self.save_safetensors(path)?,
        }
        Ok(())
    }

    fn save_safetensors(&self, path: &Path) -> Result<()> {
        let views = self
            .tensors
            .iter()
            .map(|t| {
                let bytes: &[u8] = bytemuck::cast_slice(t.data.as_slice());
                TensorView::new(Dtype::F32, t.shape.clone(), bytes)
                    .map(|view| (t.name.as_str(), view))
                    .map_err(|e| Error::Serialization(format!("tensor {}: {e}", t.name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut metadata: HashMap<String, String> = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        metadata.insert("model_name".to_string(), self.model_name.clone());
        // SafeTensors sorts tensors by dtype and name; keep the original order
        let order: Vec<&str> = self.tensors.iter().map(|t| t.name.as_str()).collect();
        metadata.insert("tensor_order".to_string(), order.join(","));

        let bytes = safetensors::serialize(views, &Some(metadata))
            .map_err(|e| Error::Serialization(format!("SafeTensors serialization failed: {e}")))?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Read a snapshot written by [`ModelState::save`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match CheckpointFormat::from_path(path) {
            CheckpointFormat::Json => {
                let data = fs::read_to_string(path)?;
                serde_json::from_str(&data)
                    .map_err(|e| Error::Serialization(format!("JSON parsing failed: {e}")))
            }
            CheckpointFormat::SafeTensors => Self::load_safetensors(path),
        }
    }

    fn load_safetensors(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let (_, header) = safetensors::SafeTensors::read_metadata(&data)
            .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;
        let mut metadata: BTreeMap<String, String> = header
            .metadata()
            .as_ref()
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let model_name = metadata
            .remove("model_name")
            .unwrap_or_else(|| "unknown".to_string());
        let order = metadata.remove("tensor_order");

        let st = safetensors::SafeTensors::deserialize(&data)
            .map_err(|e| Error::Serialization(format!("SafeTensors parsing failed: {e}")))?;

        let names: Vec<String> = match order {
            Some(order) if !order.is_empty() => order.split(',').map(str::to_string).collect(),
            Some(_) => Vec::new(),
            None => {
                let mut names: Vec<String> = st.names().into_iter().map(|n| n.to_string()).collect();
                names.sort();
                names
            }
        };

        let tensors = names
            .into_iter()
            .map(|name| {
                let view = st
                    .tensor(&name)
                    .map_err(|e| Error::Serialization(format!("tensor {name}: {e}")))?;
                if view.dtype() != Dtype::F32 {
                    return Err(Error::Serialization(format!(
                        "tensor {name} has dtype {:?}, expected F32",
                        view.dtype()
                    )));
                }
                Ok(NamedTensor {
                    shape: view.shape().to_vec(),
                    data: decode_f32(view.data()),
                    name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            model_name,
            tensors,
            metadata,
        })
    }
}

/// Little-endian f32 decode; tensor data is not guaranteed to be aligned
pub(crate) fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
