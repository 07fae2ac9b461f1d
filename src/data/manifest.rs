//! CSV manifests of `(image, label)` rows, train/valid splitting and label
//! encoding
//!
//! The parser is deliberately small: a header row is required, fields are
//! separated by a single-byte delimiter and may be double-quoted.

use super::dataset::Sample;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// How to read a manifest file
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestConfig {
    /// Column holding the sample reference (file stem).
    pub reference_column: String,
    /// Column holding the raw label.
    pub label_column: String,
    /// Directory prepended to every reference.
    pub prefix: PathBuf,
    /// Extension appended to every reference (without the dot).
    pub extension: String,
    /// Keep only the first `limit` rows.
    pub limit: Option<usize>,
    /// Field delimiter (default: `,`).
    pub delimiter: u8,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            reference_column: "image".to_string(),
            label_column: "level".to_string(),
            prefix: PathBuf::new(),
            extension: "f32".to_string(),
            limit: None,
            delimiter: b',',
        }
    }
}

impl ManifestConfig {
    pub fn prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = ext.into();
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn columns(mut self, reference: impl Into<String>, label: impl Into<String>) -> Self {
        self.reference_column = reference.into();
        self.label_column = label.into();
        self
    }

    pub fn delimiter(mut self, d: u8) -> Self {
        self.delimiter = d;
        self
    }

    fn resolve(&self, reference: &str) -> PathBuf {
        if self.extension.is_empty() {
            self.prefix.join(reference)
        } else {
            self.prefix.join(format!("{reference}.{}", self.extension))
        }
    }
}

/// One manifest row with its reference already resolved to a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub label: String,
}

/// Ordered rows of a manifest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Read a manifest file from disk.
    pub fn load(path: impl AsRef<Path>, config: &ManifestConfig) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read manifest {}: {e}", path.display()))
        })?;
        Self::parse(&content, config)
    }

    /// Parse a manifest from an in-memory string.
    pub fn parse(content: &str, config: &ManifestConfig) -> Result<Self> {
        let delim = config.delimiter as char;
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty());

        let (_, header) = lines
            .next()
            .ok_or_else(|| Error::Config("manifest is empty".to_string()))?;
        let header = split_fields(header, delim);
        let column = |name: &str| {
            header.iter().position(|h| h == name).ok_or_else(|| {
                Error::Config(format!(
                    "manifest has no column '{name}' (found: {})",
                    header.join(", ")
                ))
            })
        };
        let ref_col = column(&config.reference_column)?;
        let label_col = column(&config.label_column)?;

        let mut entries = Vec::new();
        for (line_no, line) in lines {
            if config.limit.is_some_and(|limit| entries.len() >= limit) {
                break;
            }
            let fields = split_fields(line, delim);
            if fields.len() != header.len() {
                return Err(Error::Config(format!(
                    "manifest line {} has {} columns, expected {}",
                    line_no + 1,
                    fields.len(),
                    header.len()
                )));
            }
            entries.push(ManifestEntry {
                path: config.resolve(&fields[ref_col]),
                label: fields[label_col].clone(),
            });
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw labels in row order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.label.as_str())
    }

    /// Shuffle with `seed` and split off `ceil(valid_fraction * len)` rows
    /// for validation. Returns `(train, valid)`.
    pub fn split(&self, valid_fraction: f64, seed: u64) -> Result<(Manifest, Manifest)> {
        if !(valid_fraction > 0.0 && valid_fraction < 1.0) {
            return Err(Error::Config(format!(
                "valid_fraction must be in (0, 1), got {valid_fraction}"
            )));
        }
        let n = self.entries.len();
        let n_valid = (valid_fraction * n as f64).ceil() as usize;
        if n_valid == 0 || n_valid >= n {
            return Err(Error::Config(format!(
                "cannot split {n} rows with valid_fraction {valid_fraction}: one side would be empty"
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));

        let pick = |idx: &[usize]| Manifest {
            entries: idx.iter().map(|&i| self.entries[i].clone()).collect(),
        };
        let (valid_idx, train_idx) = order.split_at(n_valid);
        Ok((pick(train_idx), pick(valid_idx)))
    }

    /// Encode labels and produce dataset samples
    pub fn samples(&self, encoder: &LabelEncoder) -> Result<Vec<Sample>> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let label = encoder.transform(&e.label).map_err(|_| {
                    Error::data(i, format!("label '{}' was not seen when fitting", e.label))
                })?;
                Ok(Sample::new(e.path.clone(), label))
            })
            .collect()
    }
}

fn split_fields(line: &str, delim: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == delim && !quoted => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Maps raw labels to contiguous class indices
///
/// Classes are sorted numerically when every label parses as a number,
/// lexicographically otherwise.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelEncoder {
    classes: Vec<String>,
    index: BTreeMap<String, usize>,
}

impl LabelEncoder {
    pub fn fit<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut classes: Vec<String> = labels.into_iter().map(str::to_string).collect();
        classes.sort();
        classes.dedup();
        // numeric labels order by value; equal values ("1", "1.0") stay distinct
        let numeric: Option<Vec<f64>> = classes.iter().map(|c| c.parse().ok()).collect();
        if let Some(values) = numeric {
            let mut keyed: Vec<(f64, String)> = values.into_iter().zip(classes).collect();
            keyed.sort_by(|(x, _), (y, _)| x.total_cmp(y));
            classes = keyed.into_iter().map(|(_, c)| c).collect();
        }

        let index = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self { classes, index }
    }

    pub fn transform(&self, label: &str) -> Result<usize> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| Error::Config(format!("unknown label '{label}'")))
    }

    pub fn inverse(&self, class: usize) -> Option<&str> {
        self.classes.get(class).map(String::as_str)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}
