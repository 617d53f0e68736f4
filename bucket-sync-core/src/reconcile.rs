//! The content-addressed reconciler: indexes local and remote files by hash,
//! prunes duplicate remote copies and uploads local content the bucket lacks.
//!
//! Identity is the content hash alone. A local file whose bytes match *any*
//! remote object, whatever its name, counts as already synced. Remote objects
//! without a known hash never take part in duplicate detection and never
//! satisfy an "already uploaded" check.
//!
//! All indices preserve first-insertion order, so duplicate groups are visited
//! in the order the listing first returned each hash, and the survivor of a
//! group is the first member the listing returned.

use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::contract::{RemoteStorage, UploadRequest};
use crate::error::{StorageError, SyncError};
use crate::file::{FileEntity, LocalFile, RemoteFile};
use crate::retry::{with_retry, RetryPolicy};

/// A set of remote objects sharing one content hash, in listing order.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateGroup<'a> {
    pub hash: &'a str,
    pub files: &'a [RemoteFile],
}

/// What `upload_if_needed` decided for one local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { target_name: String },
    /// The content already exists in the bucket.
    Skipped,
}

/// Which remote operation a recorded failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedOperation {
    Scan,
    Upload,
    Delete,
}

/// A per-file failure carried through to the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub operation: FailedOperation,
    /// Local path or remote object name.
    pub location: String,
    pub message: String,
}

impl FailureReport {
    pub fn from_error(error: &SyncError) -> Self {
        let (operation, location) = match error {
            SyncError::LocalRead { path, .. } => {
                (FailedOperation::Scan, path.display().to_string())
            }
            SyncError::RemoteListing { bucket, .. } => (FailedOperation::Scan, bucket.clone()),
            SyncError::Upload { path, .. } => (FailedOperation::Upload, path.display().to_string()),
            SyncError::Delete { file_name, .. } => (FailedOperation::Delete, file_name.clone()),
            SyncError::ScanInterrupted(_) => (FailedOperation::Scan, String::new()),
        };
        FailureReport {
            operation,
            location,
            message: error.to_string(),
        }
    }
}

/// Totals of one upload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Per-run reconciliation state for one bucket and a set of local directories.
///
/// Construct one per run; counters only ever grow and are never reset.
#[derive(Debug)]
pub struct Reconciler {
    bucket: String,
    directories: Vec<PathBuf>,
    local_by_hash: IndexMap<String, Vec<LocalFile>>,
    remote_by_hash: IndexMap<String, Vec<RemoteFile>>,
    unhashed_remote: Vec<RemoteFile>,
    local_entries: usize,
    remote_entries: usize,
    uploaded_count: usize,
    deleted_count: usize,
    failures: Vec<FailureReport>,
}

impl Reconciler {
    pub fn new(bucket: impl Into<String>, directories: Vec<PathBuf>) -> Self {
        Reconciler {
            bucket: bucket.into(),
            directories,
            local_by_hash: IndexMap::new(),
            remote_by_hash: IndexMap::new(),
            unhashed_remote: Vec::new(),
            local_entries: 0,
            remote_entries: 0,
            uploaded_count: 0,
            deleted_count: 0,
            failures: Vec::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn index_local<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = LocalFile>,
    {
        for file in files {
            self.local_entries += 1;
            self.local_by_hash
                .entry(file.hash().to_string())
                .or_default()
                .push(file);
        }
    }

    pub fn index_remote<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = RemoteFile>,
    {
        for file in files {
            self.remote_entries += 1;
            match file.content_hash().map(str::to_string) {
                Some(hash) => self.remote_by_hash.entry(hash).or_default().push(file),
                None => {
                    debug!(name = file.name(), "Remote object has no content hash");
                    self.unhashed_remote.push(file);
                }
            }
        }
    }

    /// Most recently indexed local file for each distinct hash.
    pub fn latest_local(&self) -> impl Iterator<Item = &LocalFile> {
        self.local_by_hash.values().filter_map(|files| files.last())
    }

    /// Most recently indexed remote object for each distinct hash.
    pub fn latest_remote(&self) -> impl Iterator<Item = &RemoteFile> {
        self.remote_by_hash.values().filter_map(|files| files.last())
    }

    /// Local files sharing `hash`, in enumeration order.
    pub fn local_group(&self, hash: &str) -> &[LocalFile] {
        self.local_by_hash
            .get(hash)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Remote objects currently indexed under `hash`, in listing order.
    pub fn remote_group(&self, hash: &str) -> &[RemoteFile] {
        self.remote_by_hash
            .get(hash)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every hash held by two or more remote objects.
    pub fn find_duplicate_groups(&self) -> Vec<DuplicateGroup<'_>> {
        self.remote_by_hash
            .iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|(hash, files)| DuplicateGroup {
                hash,
                files: files.as_slice(),
            })
            .collect()
    }

    /// Delete every duplicate remote copy, keeping the first-listed object of
    /// each group. Returns the number of versions deleted by this call.
    pub async fn prune_duplicates<S>(
        &mut self,
        storage: &S,
        retry: &RetryPolicy,
        concurrency: usize,
    ) -> usize
    where
        S: RemoteStorage + ?Sized,
    {
        let hashes: Vec<String> = self
            .find_duplicate_groups()
            .iter()
            .map(|group| group.hash.to_string())
            .collect();
        info!(
            bucket = %self.bucket,
            groups = hashes.len(),
            "[SYNC][PRUNE] Found duplicate groups"
        );

        let mut deleted = 0;
        for hash in hashes {
            deleted += self
                .prune_group(storage, Some(&hash), retry, concurrency)
                .await;
        }
        deleted
    }

    /// Delete all but the first-listed object indexed under `hash`.
    ///
    /// Unknown hashes (`None`) are never pruned. Successful deletions bump the
    /// deleted counter and leave the index; failed ones are recorded and stay
    /// indexed, since the object still exists.
    pub async fn prune_group<S>(
        &mut self,
        storage: &S,
        hash: Option<&str>,
        retry: &RetryPolicy,
        concurrency: usize,
    ) -> usize
    where
        S: RemoteStorage + ?Sized,
    {
        let Some(hash) = hash else {
            return 0;
        };
        let targets: Vec<(String, String)> = match self.remote_by_hash.get(hash) {
            Some(files) if files.len() > 1 => files
                .iter()
                .skip(1)
                .map(|f| (f.name().to_string(), f.version_id().to_string()))
                .collect(),
            _ => return 0,
        };
        info!(
            hash,
            survivor = self.remote_by_hash[hash][0].name(),
            victims = targets.len(),
            "[SYNC][PRUNE] Removing duplicate copies"
        );

        let results: Vec<(String, String, Result<(), StorageError>)> = stream::iter(targets)
            .map(move |(file_name, version_id)| async move {
                info!(file_name = %file_name, version_id = %version_id, "[SYNC][PRUNE] Deleting version");
                let result = with_retry("delete_object_version", retry, || {
                    storage.delete_object_version(&file_name, &version_id)
                })
                .await;
                (file_name, version_id, result)
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut removed: HashSet<String> = HashSet::new();
        for (file_name, version_id, result) in results {
            match result {
                Ok(()) => {
                    self.deleted_count += 1;
                    removed.insert(version_id);
                }
                Err(source) => {
                    let error = SyncError::Delete {
                        file_name,
                        version_id,
                        source,
                    };
                    warn!(error = %error, "[SYNC][PRUNE] Delete failed");
                    self.failures.push(FailureReport::from_error(&error));
                }
            }
        }

        if let Some(files) = self.remote_by_hash.get_mut(hash) {
            let mut position = 0usize;
            files.retain(|f| {
                let keep = position == 0 || !removed.contains(f.version_id());
                position += 1;
                keep
            });
        }
        removed.len()
    }

    /// True when some remote object holds the same content, regardless of name.
    pub fn is_already_remote(&self, local: &LocalFile) -> bool {
        self.remote_by_hash.contains_key(local.hash())
    }

    fn upload_request(&self, local: &LocalFile, target_name: Option<&str>) -> UploadRequest {
        UploadRequest {
            bucket: self.bucket.clone(),
            source_path: local.path().to_path_buf(),
            content_hash: local.hash().to_string(),
            target_name: target_name
                .map(str::to_string)
                .unwrap_or_else(|| local.sanitized_filename()),
        }
    }

    /// Upload `local` unless its content is already in the bucket (or `force`).
    ///
    /// The upload counter only moves when storage confirms the upload.
    pub async fn upload_if_needed<S>(
        &mut self,
        storage: &S,
        local: &LocalFile,
        target_name: Option<&str>,
        force: bool,
        retry: &RetryPolicy,
    ) -> Result<UploadOutcome, SyncError>
    where
        S: RemoteStorage + ?Sized,
    {
        if !force && self.is_already_remote(local) {
            debug!(path = %local.path().display(), "Content already in bucket, skipping upload");
            return Ok(UploadOutcome::Skipped);
        }
        let request = self.upload_request(local, target_name);
        dispatch_upload(storage, &request, retry).await?;
        self.uploaded_count += 1;
        Ok(UploadOutcome::Uploaded {
            target_name: request.target_name,
        })
    }

    /// Upload one representative file per local content hash, up to
    /// `concurrency` at a time. Failures are recorded, never fatal.
    pub async fn upload_all<S>(
        &mut self,
        storage: &S,
        force: bool,
        concurrency: usize,
        retry: &RetryPolicy,
    ) -> UploadSummary
    where
        S: RemoteStorage + ?Sized,
    {
        let mut summary = UploadSummary::default();
        let mut pending = Vec::new();
        for local in self.latest_local() {
            if !force && self.is_already_remote(local) {
                debug!(path = %local.path().display(), "Content already in bucket, skipping upload");
                summary.skipped += 1;
            } else {
                pending.push(self.upload_request(local, None));
            }
        }
        info!(
            bucket = %self.bucket,
            pending = pending.len(),
            skipped = summary.skipped,
            "[SYNC][UPLOAD] Starting uploads"
        );

        let results: Vec<Result<(), SyncError>> = stream::iter(pending.iter())
            .map(|request| dispatch_upload(storage, request, retry))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Ok(()) => {
                    self.uploaded_count += 1;
                    summary.uploaded += 1;
                }
                Err(error) => {
                    summary.failed += 1;
                    self.failures.push(FailureReport::from_error(&error));
                }
            }
        }
        summary
    }

    pub(crate) fn record_failure(&mut self, error: &SyncError) {
        self.failures.push(FailureReport::from_error(error));
    }

    pub fn uploaded_count(&self) -> usize {
        self.uploaded_count
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted_count
    }

    /// Distinct local contents indexed.
    pub fn local_file_count(&self) -> usize {
        self.local_by_hash.len()
    }

    /// Distinct remote contents: one per known hash, plus each unhashed object.
    pub fn remote_file_count(&self) -> usize {
        self.remote_by_hash.len() + self.unhashed_remote.len()
    }

    /// Local files indexed, byte-identical copies included.
    pub fn local_entries(&self) -> usize {
        self.local_entries
    }

    /// Remote objects indexed, duplicates included.
    pub fn remote_entries(&self) -> usize {
        self.remote_entries
    }

    pub fn failures(&self) -> &[FailureReport] {
        &self.failures
    }

    pub(crate) fn take_failures(&mut self) -> Vec<FailureReport> {
        std::mem::take(&mut self.failures)
    }
}

async fn dispatch_upload<S>(
    storage: &S,
    request: &UploadRequest,
    retry: &RetryPolicy,
) -> Result<(), SyncError>
where
    S: RemoteStorage + ?Sized,
{
    info!(
        path = %request.source_path.display(),
        target = %request.target_name,
        hash = %request.content_hash,
        "[SYNC][UPLOAD] Uploading file"
    );
    with_retry("upload_object", retry, || storage.upload_object(request))
        .await
        .map_err(|source| {
            let error = SyncError::Upload {
                path: request.source_path.clone(),
                target: request.target_name.clone(),
                source,
            };
            warn!(error = %error, "[SYNC][UPLOAD] Upload failed");
            error
        })
}
