//! High-level pipeline: orchestrates list → scan → prune → upload for one bucket.
//!
//! This module provides the top-level orchestration for a single
//! synchronisation run. The phases always run in this order:
//!   1. List the bucket and index every remote object by content hash
//!   2. Scan the local directories and index every file by content hash
//!   3. Delete duplicate remote copies, keeping the first-listed one
//!   4. Upload local content that the bucket does not hold yet
//!   5. Return a [`SyncReport`] with counts and per-file failures
//!
//! Pruning finishes before the first upload starts, so only duplicates that
//! existed before the run are ever deleted.
//!
//! Hashing local files is blocking file I/O, so the scan runs on tokio's
//! blocking pool and the scanner is handed over as an `Arc`.
//!
//! # Error Handling
//! A bucket listing that cannot be fetched or parsed aborts the run with
//! [`SyncError::RemoteListing`]. Unreadable local entries, failed uploads and
//! failed deletions are collected into [`SyncReport::failures`] and never stop
//! the remaining work.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::contract::{LocalEnumerator, RemoteStorage};
use crate::error::SyncError;
use crate::reconcile::{FailureReport, Reconciler};
use crate::remote::list_remote_files;

/// Outcome of a synchronisation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub bucket: String,
    pub directories: Vec<PathBuf>,
    /// Distinct contents found in the bucket.
    pub remote_files: usize,
    /// Objects listed, duplicates included.
    pub remote_objects: usize,
    /// Distinct contents found locally.
    pub local_files: usize,
    /// Local files hashed, identical copies included.
    pub local_entries: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failures: Vec<FailureReport>,
}

impl SyncReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub async fn synchronise<S, L>(
    config: &SyncConfig,
    storage: &S,
    scanner: Arc<L>,
) -> Result<SyncReport, SyncError>
where
    S: RemoteStorage + ?Sized,
    L: LocalEnumerator + ?Sized + 'static,
{
    info!(bucket = %config.bucket, "[SYNC] Starting synchronisation");
    let mut reconciler = Reconciler::new(config.bucket.clone(), config.directories.clone());

    // Step 1: remote listing. Any failure here ends the run.
    let remote = match list_remote_files(storage, &config.bucket, &config.retry).await {
        Ok(files) => files,
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Bucket listing failed");
            return Err(e);
        }
    };
    reconciler.index_remote(remote);
    info!(
        objects = reconciler.remote_entries(),
        distinct = reconciler.remote_file_count(),
        "[SYNC] Indexed remote files"
    );

    // Step 2: local scan, off the async workers.
    let directories = config.directories.clone();
    let scan = match tokio::task::spawn_blocking(move || scanner.scan(&directories)).await {
        Ok(scan) => scan,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Local scan was cancelled");
            return Err(SyncError::ScanInterrupted(e.to_string()));
        }
    };
    for failure in &scan.failures {
        reconciler.record_failure(&failure.error);
    }
    reconciler.index_local(scan.files);
    info!(
        files = reconciler.local_entries(),
        distinct = reconciler.local_file_count(),
        unreadable = scan.failures.len(),
        "[SYNC] Indexed local files"
    );

    // Step 3: prune duplicates before anything is uploaded.
    let deleted = reconciler
        .prune_duplicates(storage, &config.retry, config.delete_concurrency)
        .await;
    info!(deleted, "[SYNC] Duplicate pruning complete");

    // Step 4: upload what is missing.
    let uploads = reconciler
        .upload_all(
            storage,
            config.force,
            config.upload_concurrency,
            &config.retry,
        )
        .await;
    info!(
        uploaded = uploads.uploaded,
        skipped = uploads.skipped,
        failed = uploads.failed,
        "[SYNC] Upload phase complete"
    );

    let report = SyncReport {
        bucket: config.bucket.clone(),
        directories: config.directories.clone(),
        remote_files: reconciler.remote_file_count(),
        remote_objects: reconciler.remote_entries(),
        local_files: reconciler.local_file_count(),
        local_entries: reconciler.local_entries(),
        uploaded: reconciler.uploaded_count(),
        skipped: uploads.skipped,
        deleted: reconciler.deleted_count(),
        failures: reconciler.take_failures(),
    };
    info!(
        uploaded = report.uploaded,
        deleted = report.deleted,
        failures = report.failures.len(),
        "[SYNC] Synchronisation finished"
    );
    Ok(report)
}
