//! Error taxonomy.
//!
//! Structural errors (schema, discovery, registry misuse) abort eagerly.
//! Data and analysis errors are recovered per task by the pipeline and end
//! up as `Failed` rows in the result table.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Invalid metadata at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("signal {signal} references channel {channel}, which is not in the channel map")]
    UnknownChannel { signal: String, channel: u32 },

    #[error("duplicate signal {0} (same source location and tag)")]
    DuplicateSignal(String),

    #[error("experiment has no signals")]
    NoSignals,
}

/// Malformed batch description. Fatal to the whole run.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("batch root does not exist: {}", .0.display())]
    MissingRoot(PathBuf),

    #[error("no manifest named `{name}` found under {}", .root.display())]
    NoManifest { root: PathBuf, name: String },

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("unsupported manifest extension for {}", .0.display())]
    UnsupportedManifest(PathBuf),

    #[error("manifest {} references a missing file: {}", .manifest.display(), .missing.display())]
    MissingFile { manifest: PathBuf, missing: PathBuf },

    #[error("experiment `{id}` in {}: {source}", .manifest.display())]
    Schema {
        manifest: PathBuf,
        id: String,
        #[source]
        source: SchemaError,
    },

    #[error("duplicate experiment id `{0}`")]
    DuplicateId(String),
}

/// Per-signal data problems raised on materialization.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("no format adapter registered for `{0}`")]
    UnsupportedFormat(String),

    #[error("failed to load {}: {source}", .location.display())]
    Load {
        location: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("data integrity violation for {}: {reason}", .location.display())]
    DataIntegrity { location: PathBuf, reason: String },

    #[error("signal {0} does not belong to this recording")]
    ForeignSignal(String),
}

impl DataError {
    /// Short machine-readable label, used in result rows.
    pub fn kind(&self) -> &'static str {
        match self {
            DataError::UnsupportedFormat(_) => "unsupported_format",
            DataError::Load { .. } => "load",
            DataError::DataIntegrity { .. } => "data_integrity",
            DataError::ForeignSignal(_) => "load",
        }
    }
}

/// Failure reported by an analysis method.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("{0}")]
    Failed(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("cancelled")]
    Cancelled,
}

impl AnalysisError {
    /// Convenience constructor for method-reported failures.
    pub fn failed(message: impl Into<String>) -> Self {
        AnalysisError::Failed(message.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Data(e) => e.kind(),
            AnalysisError::DeadlineExceeded => "timeout",
            AnalysisError::Failed(_) | AnalysisError::Cancelled => "analysis",
        }
    }
}

/// Analysis registry misuse. Surfaced immediately to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown analysis method `{0}`")]
    UnknownMethod(String),

    #[error("analysis method `{0}` is already registered")]
    DuplicateName(String),
}

/// Signal set changed while a `select` view was alive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("recording `{recording}` cannot add or remove signals while {views} view(s) are alive")]
pub struct ConcurrentModificationError {
    pub recording: String,
    pub views: usize,
}

/// Top-level error for callers that do not care about the layer.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    ConcurrentModification(#[from] ConcurrentModificationError),

    #[error("invalid configuration: {0}")]
    Config(String),
}
