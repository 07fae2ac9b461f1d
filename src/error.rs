//! Error types for fitloop

use crate::train::Phase;
use thiserror::Error;

/// Coarse classification of an [`Error`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid options, detected before a run starts
    Configuration,
    /// Dataset index outside `[0, len)`
    Index,
    /// Malformed sample or decode failure
    Data,
    /// Numeric failure during a step (e.g. non-finite loss)
    Computation,
    /// A callback failed
    Callback,
    /// Filesystem or serialization failure
    Io,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Data error at sample {index}: {message}")]
    Data { index: usize, message: String },

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Callback {name} failed in {hook}: {source}")]
    Callback {
        name: String,
        hook: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Run aborted in {phase} phase at epoch {epoch}, batch {batch}: {source}")]
    Run {
        epoch: usize,
        batch: usize,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Classify this error, looking through run/callback wrappers for data
    /// and computation failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Configuration,
            Error::IndexOutOfRange { .. } => ErrorKind::Index,
            Error::Data { .. } => ErrorKind::Data,
            Error::Computation(_) | Error::ShapeMismatch { .. } => ErrorKind::Computation,
            Error::Callback { .. } => ErrorKind::Callback,
            Error::Run { source, .. } => source.kind(),
            Error::Io(_) | Error::Serialization(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn data(index: usize, message: impl Into<String>) -> Self {
        Error::Data {
            index,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
