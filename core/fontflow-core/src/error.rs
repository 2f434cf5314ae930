//! Error taxonomy for fontflow-core

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why an uploaded buffer was rejected by the detector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FontError {
    /// The leading bytes match no supported font container.
    #[error("unsupported font format")]
    UnsupportedFormat,
    /// The signature matched but the internal structure is damaged.
    #[error("corrupt font: {0}")]
    CorruptFont(String),
}

impl FontError {
    pub(crate) fn corrupt(reason: impl std::fmt::Display) -> Self {
        Self::CorruptFont(reason.to_string())
    }
}

/// Failure inside one transcoding step. Never surfaced to uploaders.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("malformed source font: {0}")]
    Malformed(String),
    #[error("unsupported source: {0}")]
    Unsupported(&'static str),
    #[error("glyph {glyph}: {reason}")]
    Glyph { glyph: u32, reason: String },
    #[error("table compilation failed: {0}")]
    Compile(String),
    #[error("compression failed")]
    Compression(#[source] io::Error),
}

/// Object-store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("invalid object key: {0:?}")]
    InvalidKey(String),
    #[error("object store I/O on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot sign url: {0}")]
    Signing(String),
}

/// Record-store failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record store I/O on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("record store contents are not valid JSON")]
    Serialization(#[from] serde_json::Error),
    #[error("record store lock poisoned")]
    Poisoned,
}

/// Everything the upload/list/delete pipeline can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no font file provided")]
    NoFileProvided,
    #[error(transparent)]
    Validation(#[from] FontError),
    #[error("object storage failure")]
    Storage(#[from] StorageError),
    #[error("record persistence failure")]
    Persistence(#[from] RepositoryError),
    #[error("font not found")]
    NotFound,
    #[error("font belongs to another user")]
    Forbidden,
}

impl PipelineError {
    /// `true` when the caller sent something wrong, `false` for infrastructure faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Persistence(_))
    }

    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoFileProvided => "no_file_provided",
            Self::Validation(FontError::UnsupportedFormat) => "unsupported_format",
            Self::Validation(FontError::CorruptFont(_)) => "corrupt_font",
            Self::Storage(_) => "storage_failure",
            Self::Persistence(_) => "persistence_failure",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
        }
    }
}
