use std::path::PathBuf;
use tracing::{debug, info};

use crate::retry::RetryPolicy;

pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 1;
pub const DEFAULT_DELETE_CONCURRENCY: usize = 4;

/// Everything one synchronisation run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub bucket: String,
    /// Directories to upload from, scanned non-recursively and in order.
    pub directories: Vec<PathBuf>,
    /// Upload even when the content already exists in the bucket.
    pub force: bool,
    pub upload_concurrency: usize,
    pub delete_concurrency: usize,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    pub fn new(bucket: impl Into<String>, directories: Vec<PathBuf>) -> Self {
        SyncConfig {
            bucket: bucket.into(),
            directories,
            force: false,
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            delete_concurrency: DEFAULT_DELETE_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.bucket,
            directories = self.directories.len(),
            force = self.force,
            upload_concurrency = self.upload_concurrency,
            delete_concurrency = self.delete_concurrency,
            max_retries = self.retry.max_retries,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
