use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Why an encoder run exited unsuccessfully, as read from its diagnostic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CorruptInput,
    DiskSpace,
    PermissionDenied,
    CodecMismatch,
    Unknown,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::CorruptInput => write!(f, "corrupt input"),
            FailureKind::DiskSpace => write!(f, "disk space"),
            FailureKind::PermissionDenied => write!(f, "permission denied"),
            FailureKind::CodecMismatch => write!(f, "codec mismatch"),
            FailureKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Flat tag for [`ConversionError`], handy for callers that branch on the category only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputNotFound,
    BinaryMissing,
    UnsupportedFormat,
    ProcessSpawnFailure,
    EncodingFailure(FailureKind),
    OutputMissingAfterSuccess,
    Cancelled,
    ProbeFailure,
    CapabilityProbeFailure,
    Io,
}

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Encoder binary not found: {0}")]
    BinaryMissing(PathBuf),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to start encoder: {0}")]
    ProcessSpawnFailure(String),

    #[error("{message}")]
    EncodingFailure { kind: FailureKind, message: String },

    #[error("Encoder reported success but no output was written to {0}")]
    OutputMissingAfterSuccess(PathBuf),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Probe failed: {0}")]
    ProbeFailure(String),

    #[error("Capability probe failed: {0}")]
    CapabilityProbeFailure(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::InputNotFound(_) => ErrorKind::InputNotFound,
            ConversionError::BinaryMissing(_) => ErrorKind::BinaryMissing,
            ConversionError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ConversionError::ProcessSpawnFailure(_) => ErrorKind::ProcessSpawnFailure,
            ConversionError::EncodingFailure { kind, .. } => ErrorKind::EncodingFailure(*kind),
            ConversionError::OutputMissingAfterSuccess(_) => ErrorKind::OutputMissingAfterSuccess,
            ConversionError::Cancelled => ErrorKind::Cancelled,
            ConversionError::ProbeFailure(_) => ErrorKind::ProbeFailure,
            ConversionError::CapabilityProbeFailure(_) => ErrorKind::CapabilityProbeFailure,
            ConversionError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConversionError>;
