//! # contract: interfaces between the reconciler and the outside world
//!
//! This module defines the two seams of the synchronisation pipeline:
//!
//! - [`RemoteStorage`]: list, upload and delete-version calls against a bucket
//!   (implemented over HTTP by the CLI crate, and by mocks in tests).
//! - [`LocalEnumerator`]: produces hashed local files from a set of directories.
//!
//! Request and response types are plain data. [`ObjectRecord`] mirrors a single
//! entry of a bucket listing and keeps every field the listing returns so that
//! a later deletion can address the exact version.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`; enable the `test-export-mocks`
//!   feature (on by default) to use `MockRemoteStorage` and
//!   `MockLocalEnumerator` from other crates' tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::StorageError;
use crate::local::LocalScan;

/// One entry of a bucket listing, as returned by the storage API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    /// Object name inside the bucket.
    pub file_name: String,
    /// Identifier of this specific stored version.
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_timestamp: Option<i64>,
    /// Custom metadata attached at upload time (e.g. `sha1`).
    #[serde(default)]
    pub file_info: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// A single page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub records: Vec<ObjectRecord>,
    /// Where the next page resumes. `None` or empty means the listing is complete.
    pub next_cursor: Option<String>,
}

/// Everything needed to store one local file in the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub bucket: String,
    pub source_path: PathBuf,
    /// Lowercase hex SHA-1 of the file; stored as custom info `sha1`.
    pub content_hash: String,
    pub target_name: String,
}

/// Remote object storage as seen by the reconciler.
///
/// Implementations are responsible for authentication, transport and mapping
/// their wire errors to [`StorageError`]. Retrying is layered on top by the
/// caller, so implementations should make exactly one attempt per call.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Fetch up to `page_size` records starting at `cursor` (`None` for the first page).
    async fn list_objects(
        &self,
        bucket: &str,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<ListPage, StorageError>;

    /// Store a local file. Must tag the stored object with `sha1=<content_hash>`.
    async fn upload_object(&self, request: &UploadRequest) -> Result<(), StorageError>;

    /// Delete one stored version of an object.
    async fn delete_object_version(
        &self,
        file_name: &str,
        version_id: &str,
    ) -> Result<(), StorageError>;
}

/// Produces hashed local files for the configured directories.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait LocalEnumerator: Send + Sync {
    /// Scan every directory. Unreadable entries are reported in the result, never raised.
    fn scan(&self, directories: &[PathBuf]) -> LocalScan;
}
