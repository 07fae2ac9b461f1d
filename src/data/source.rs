//! Sample references and the loaders that resolve them to raw values

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a sample's raw input lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleRef {
    Path(PathBuf),
    Index(usize),
}

impl fmt::Display for SampleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleRef::Path(p) => write!(f, "{}", p.display()),
            SampleRef::Index(i) => write!(f, "#{i}"),
        }
    }
}

impl From<PathBuf> for SampleRef {
    fn from(p: PathBuf) -> Self {
        SampleRef::Path(p)
    }
}

impl From<&Path> for SampleRef {
    fn from(p: &Path) -> Self {
        SampleRef::Path(p.to_path_buf())
    }
}

impl From<usize> for SampleRef {
    fn from(i: usize) -> Self {
        SampleRef::Index(i)
    }
}

/// Resolves a [`SampleRef`] to its raw, flattened values
///
/// Decoding real image formats is left to implementors; errors returned here
/// surface as data errors for the requested index.
pub trait SampleLoader {
    fn load(&self, reference: &SampleRef) -> Result<Vec<f32>>;
}

/// On-disk encoding of a raw tensor file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEncoding {
    /// Little-endian `f32` values
    F32Le,
    /// One byte per value (pixel intensities 0..=255)
    U8,
}

impl RawEncoding {
    /// Detect the encoding from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "f32" | "bin" => Some(RawEncoding::F32Le),
            "u8" | "raw" => Some(RawEncoding::U8),
            _ => None,
        }
    }
}

/// Reads headerless raw tensor files (`.f32`/`.bin` or `.u8`/`.raw`)
#[derive(Debug, Clone, Default)]
pub struct RawTensorLoader {
    encoding: Option<RawEncoding>,
}

impl RawTensorLoader {
    /// Detect the encoding from each file's extension
    pub fn new() -> Self {
        Self::default()
    }

    /// Use one encoding for every file regardless of extension
    pub fn with_encoding(encoding: RawEncoding) -> Self {
        Self {
            encoding: Some(encoding),
        }
    }

    fn encoding_for(&self, path: &Path) -> Result<RawEncoding> {
        if let Some(enc) = self.encoding {
            return Ok(enc);
        }
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(RawEncoding::from_extension)
            .ok_or_else(|| {
                Error::Serialization(format!(
                    "cannot infer raw encoding of {} (use .f32, .bin, .u8 or .raw)",
                    path.display()
                ))
            })
    }

    /// Decode raw bytes with the given encoding
    pub fn decode(bytes: &[u8], encoding: RawEncoding) -> Result<Vec<f32>> {
        match encoding {
            RawEncoding::U8 => Ok(bytes.iter().map(|&b| f32::from(b)).collect()),
            RawEncoding::F32Le => {
                if bytes.len() % 4 != 0 {
                    return Err(Error::Serialization(format!(
                        "{} bytes is not a whole number of f32 values",
                        bytes.len()
                    )));
                }
                Ok(bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect())
            }
        }
    }
}

impl SampleLoader for RawTensorLoader {
    fn load(&self, reference: &SampleRef) -> Result<Vec<f32>> {
        let path = match reference {
            SampleRef::Path(p) => p,
            SampleRef::Index(i) => {
                return Err(Error::Config(format!(
                    "RawTensorLoader needs a file path, got index {i}"
                )))
            }
        };
        let encoding = self.encoding_for(path)?;
        let bytes = fs::read(path)?;
        Self::decode(&bytes, encoding)
    }
}

/// Write values as a little-endian `f32` raw file
pub fn write_raw_f32(path: impl AsRef<Path>, values: &[f32]) -> Result<()> {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encoding_from_extension() {
        assert_eq!(RawEncoding::from_extension("F32"), Some(RawEncoding::F32Le));
        assert_eq!(RawEncoding::from_extension("u8"), Some(RawEncoding::U8));
        assert_eq!(RawEncoding::from_extension("jpg"), None);
    }

    #[test]
    fn test_f32_roundtrip_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.f32");
        write_raw_f32(&path, &[1.5, -2.0, 0.25]).unwrap();

        let values = RawTensorLoader::new().load(&SampleRef::from(path)).unwrap();
        assert_eq!(values, vec![1.5, -2.0, 0.25]);
    }

    #[test]
    fn test_u8_decode() {
        let values = RawTensorLoader::decode(&[0, 128, 255], RawEncoding::U8).unwrap();
        assert_eq!(values, vec![0.0, 128.0, 255.0]);
    }

    #[test]
    fn test_truncated_f32_file_is_error() {
        assert!(RawTensorLoader::decode(&[0, 0, 0], RawEncoding::F32Le).is_err());
    }

    #[test]
    fn test_unknown_extension_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.jpg");
        std::fs::write(&path, [0u8; 4]).unwrap();
        assert!(RawTensorLoader::new().load(&SampleRef::from(path)).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RawTensorLoader::new()
            .load(&SampleRef::from(PathBuf::from("/nonexistent/a.f32")))
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
