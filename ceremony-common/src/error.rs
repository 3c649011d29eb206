//! Error taxonomy shared by the pipeline, the runtime accessor and the tools.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::CircuitKey;

/// Aggregated error type for ceremony artifact handling.
#[derive(Debug, Error)]
pub enum CeremonyError {
    /// Malformed beacon source data or configuration values.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A catalog entry name did not match `<nullifiers>x<commitments>`.
    #[error("malformed catalog entry '{name}'")]
    MalformedCatalogEntry { name: String },

    /// Reading from the content-addressed store failed.
    #[error("failed to fetch {path}: {message}")]
    Fetch { path: String, message: String },

    /// Writing to (or pinning in) the content-addressed store failed.
    #[error("publish error: {0}")]
    Publish(String),

    /// Full-package mode was requested but a native-compiler output is absent.
    #[error("missing prerequisite for circuit {circuit}: {}", .path.display())]
    MissingPrerequisite { circuit: CircuitKey, path: PathBuf },

    /// The cryptographic setup collaborator failed.
    #[error("setup finalization error: {0}")]
    Finalize(String),

    /// Compression failed or did not round-trip.
    #[error("compression error: {0}")]
    Compression(String),

    /// Verification key does not have the expected shape.
    #[error("malformed verification key: {0}")]
    MalformedVerificationKey(String),

    /// Bytes on disk do not match their recorded digest.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The package does not contain the requested circuit.
    #[error("circuit {0} is not part of this package")]
    UnknownCircuit(CircuitKey),

    #[error("io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CeremonyError {
    /// Attach a path to an I/O failure.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        CeremonyError::Io {
            path: path.into(),
            source,
        }
    }

    /// Get a machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            CeremonyError::InvalidInput(_) => "INVALID_INPUT",
            CeremonyError::MalformedCatalogEntry { .. } => "MALFORMED_CATALOG_ENTRY",
            CeremonyError::Fetch { .. } => "FETCH_ERROR",
            CeremonyError::Publish(_) => "PUBLISH_ERROR",
            CeremonyError::MissingPrerequisite { .. } => "MISSING_PREREQUISITE",
            CeremonyError::Finalize(_) => "FINALIZE_ERROR",
            CeremonyError::Compression(_) => "COMPRESSION_ERROR",
            CeremonyError::MalformedVerificationKey(_) => "MALFORMED_VKEY",
            CeremonyError::Integrity(_) => "INTEGRITY_ERROR",
            CeremonyError::UnknownCircuit(_) => "UNKNOWN_CIRCUIT",
            CeremonyError::Io { .. } => "IO_ERROR",
            CeremonyError::Json(_) => "JSON_ERROR",
        }
    }

    /// Transport failures can be retried by re-running the whole pipeline.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CeremonyError::Fetch { .. } | CeremonyError::Publish(_)
        )
    }
}
