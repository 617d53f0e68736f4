//! Error types shared by the enumerators, the reconciler and storage backends.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`RemoteStorage`](crate::contract::RemoteStorage) implementation.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The request never produced a response (connection, DNS, timeout).
    #[error("network error: {0}")]
    Transport(String),

    /// The storage API answered with an error status.
    #[error("storage API error (status {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// The response body could not be decoded into the expected structure.
    #[error("malformed storage response: {0}")]
    Malformed(String),

    /// The local source of an upload could not be read.
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Transport(_) => true,
            StorageError::Api { status, code, .. } => {
                matches!(*status, 408 | 429 | 500..=599)
                    || code == "service_unavailable"
                    || code == "too_many_requests"
            }
            StorageError::Malformed(_) | StorageError::Io { .. } => false,
        }
    }
}

/// Errors surfaced by a synchronisation run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A local file vanished or could not be read while hashing.
    #[error("failed to read local file {}: {source}", path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The bucket listing could not be obtained or parsed. Fatal for the run.
    #[error("failed to list bucket {bucket}: {source}")]
    RemoteListing {
        bucket: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to upload {} as {target}: {source}", path.display())]
    Upload {
        path: PathBuf,
        target: String,
        #[source]
        source: StorageError,
    },

    #[error("failed to delete version {version_id} of {file_name}: {source}")]
    Delete {
        file_name: String,
        version_id: String,
        #[source]
        source: StorageError,
    },

    /// The background scan of local directories stopped before finishing.
    #[error("local scan did not complete: {0}")]
    ScanInterrupted(String),
}
