//! Ingestion error taxonomy
//!
//! Every fatal failure of a source run ends up as an [`IngestError`], and each
//! variant maps to its own process exit code so the task runner can tell
//! failures apart per source.

use crate::storage::StorageError;
use crate::versioning::ResolveError;
use thiserror::Error;

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing or malformed runtime configuration, source document or credential.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not resolve remote version for '{source_id}': {source}")]
    Resolution {
        source_id: String,
        #[source]
        source: ResolveError,
    },

    /// Retries for a transient network failure were exhausted.
    #[error("{host}: giving up after {attempts} attempts: {message}")]
    TransientNetwork {
        host: String,
        attempts: u32,
        message: String,
    },

    #[error("transfer of {locator} failed: {message}")]
    Transfer { locator: String, message: String },

    #[error("rotation of '{key}' failed: {source}")]
    Rotation {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("extraction of '{path}' failed: {message}")]
    Extraction { path: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("manifest error: {0}")]
    Manifest(String),
}

impl IngestError {
    pub fn transfer(locator: impl Into<String>, message: impl ToString) -> Self {
        Self::Transfer {
            locator: locator.into(),
            message: message.to_string(),
        }
    }

    pub fn resolution(source_id: impl Into<String>, source: ResolveError) -> Self {
        Self::Resolution {
            source_id: source_id.into(),
            source,
        }
    }

    pub fn extraction(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code reported to the task runner.
    pub fn exit_code(&self) -> u8 {
        match self {
            IngestError::Config(_) => 2,
            IngestError::Resolution { .. } => 3,
            IngestError::TransientNetwork { .. } => 4,
            IngestError::Transfer { .. } => 5,
            IngestError::Rotation { .. } => 6,
            IngestError::Extraction { .. } => 7,
            IngestError::Storage(_) => 8,
            IngestError::Manifest(_) => 9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = vec![
            IngestError::Config("x".into()),
            IngestError::Resolution {
                source_id: "hgnc".into(),
                source: ResolveError::Format("no table".into()),
            },
            IngestError::TransientNetwork {
                host: "ftp.example.org".into(),
                attempts: 5,
                message: "reset".into(),
            },
            IngestError::transfer("https://example.org/a", "HTTP 500"),
            IngestError::Rotation {
                key: "raw/a/latest/1/x".into(),
                source: StorageError::NotFound("raw/a/latest/1/x".into()),
            },
            IngestError::extraction("raw/a/latest/1/x.gz", "bad header"),
            IngestError::Storage(StorageError::NotFound("k".into())),
            IngestError::Manifest("x".into()),
        ];

        let codes: HashSet<u8> = errors.iter().map(IngestError::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_resolution_message_names_source() {
        let err = IngestError::Resolution {
            source_id: "tiga".into(),
            source: ResolveError::Format("file containing 'x' not found".into()),
        };
        assert!(err.to_string().contains("tiga"));
    }
}
