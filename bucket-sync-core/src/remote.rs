//! Paginated enumeration of the bucket into [`RemoteFile`]s.

use tracing::{debug, error, info};

use crate::contract::RemoteStorage;
use crate::error::SyncError;
use crate::file::RemoteFile;
use crate::retry::{with_retry, RetryPolicy};

/// Records requested per listing call.
pub const LIST_PAGE_SIZE: u32 = 1000;

/// List every object in `bucket`, following continuation cursors until the
/// storage reports no further page.
///
/// Any page that cannot be fetched or decoded, after retries, aborts the
/// listing with [`SyncError::RemoteListing`]; no partial result is returned.
pub async fn list_remote_files<S>(
    storage: &S,
    bucket: &str,
    retry: &RetryPolicy,
) -> Result<Vec<RemoteFile>, SyncError>
where
    S: RemoteStorage + ?Sized,
{
    let mut files = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let request_cursor = cursor.clone();
        let page = with_retry("list_objects", retry, || {
            storage.list_objects(bucket, request_cursor.clone(), LIST_PAGE_SIZE)
        })
        .await
        .map_err(|source| {
            error!(bucket, page = pages + 1, error = %source, "Failed to list bucket page");
            SyncError::RemoteListing {
                bucket: bucket.to_string(),
                source,
            }
        })?;
        pages += 1;

        debug!(
            bucket,
            page = pages,
            records = page.records.len(),
            next = ?page.next_cursor,
            "Fetched bucket listing page"
        );
        files.extend(page.records.into_iter().map(RemoteFile::from_record));

        match page.next_cursor.filter(|next| !next.is_empty()) {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    info!(bucket, pages, objects = files.len(), "Listed remote bucket");
    Ok(files)
}
