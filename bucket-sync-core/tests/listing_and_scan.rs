use bucket_sync_core::contract::{LocalEnumerator, ListPage, MockRemoteStorage, ObjectRecord};
use bucket_sync_core::error::{StorageError, SyncError};
use bucket_sync_core::file::FileEntity;
use bucket_sync_core::local::DirectoryScanner;
use bucket_sync_core::remote::{list_remote_files, LIST_PAGE_SIZE};
use bucket_sync_core::retry::RetryPolicy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn page(names: &[&str], next: Option<&str>) -> ListPage {
    ListPage {
        records: names
            .iter()
            .map(|name| ObjectRecord {
                file_name: name.to_string(),
                file_id: format!("id-{name}"),
                content_sha1: Some(format!("{:0>40}", name.len())),
                ..Default::default()
            })
            .collect(),
        next_cursor: next.map(str::to_string),
    }
}

#[tokio::test]
async fn listing_follows_cursors_until_exhausted() {
    let mut storage = MockRemoteStorage::new();
    storage
        .expect_list_objects()
        .withf(|_, cursor: &Option<String>, size: &u32| cursor.is_none() && *size == LIST_PAGE_SIZE)
        .times(1)
        .returning(|_, _, _| Ok(page(&["a", "b"], Some("c"))));
    storage
        .expect_list_objects()
        .withf(|_, cursor: &Option<String>, _| cursor.as_deref() == Some("c"))
        .times(1)
        .returning(|_, _, _| Ok(page(&["c", "d"], Some("e"))));
    storage
        .expect_list_objects()
        .withf(|_, cursor: &Option<String>, _| cursor.as_deref() == Some("e"))
        .times(1)
        .returning(|_, _, _| Ok(page(&["e"], None)));

    let files = list_remote_files(&storage, "bucket", &RetryPolicy::none())
        .await
        .unwrap();
    let names: Vec<_> = files.iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
}

#[tokio::test]
async fn empty_cursor_ends_listing() {
    let mut storage = MockRemoteStorage::new();
    storage
        .expect_list_objects()
        .times(1)
        .returning(|_, _, _| Ok(page(&["only"], Some(""))));

    let files = list_remote_files(&storage, "bucket", &RetryPolicy::none())
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
}

#[tokio::test]
async fn malformed_later_page_aborts_listing() {
    let mut storage = MockRemoteStorage::new();
    storage
        .expect_list_objects()
        .withf(|_, cursor: &Option<String>, _| cursor.is_none())
        .returning(|_, _, _| Ok(page(&["a"], Some("b"))));
    storage
        .expect_list_objects()
        .withf(|_, cursor: &Option<String>, _| cursor.is_some())
        .returning(|_, _, _| Err(StorageError::Malformed("missing field `files`".into())));

    let err = list_remote_files(&storage, "bucket", &RetryPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SyncError::RemoteListing {
            source: StorageError::Malformed(_),
            ..
        }
    ));
}

#[tokio::test]
async fn transient_listing_errors_are_retried() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let mut storage = MockRemoteStorage::new();
    storage.expect_list_objects().returning(move |_, _, _| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(StorageError::Api {
                status: 503,
                code: "service_unavailable".into(),
                message: "busy".into(),
            })
        } else {
            Ok(page(&["a"], None))
        }
    });

    let retry = RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
    };
    let files = list_remote_files(&storage, "bucket", &retry).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn scanner_skips_dotfiles_and_subdirectories() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("b.txt"), "b").unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    std::fs::write(dir.path().join(".DS_Store"), "junk").unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    std::fs::write(dir.path().join("nested").join("deep.txt"), "deep").unwrap();

    let scan = DirectoryScanner::new().scan(&[dir.path().to_path_buf()]);

    let names: Vec<_> = scan.files.iter().map(|f| f.filename()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
    assert!(scan.failures.is_empty());
}

#[test]
fn scanner_walks_directories_in_order() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    std::fs::write(first.path().join("z.txt"), "z").unwrap();
    std::fs::write(second.path().join("a.txt"), "a").unwrap();

    let scan = DirectoryScanner::new().scan(&[
        first.path().to_path_buf(),
        second.path().to_path_buf(),
    ]);
    let names: Vec<_> = scan.files.iter().map(|f| f.filename()).collect();
    assert_eq!(names, vec!["z.txt", "a.txt"]);
}

#[test]
fn scanner_reports_missing_directory_and_continues() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "a").unwrap();
    let missing = dir.path().join("missing");

    let scan = DirectoryScanner::new().scan(&[missing.clone(), dir.path().to_path_buf()]);

    assert_eq!(scan.files.len(), 1);
    assert_eq!(scan.failures.len(), 1);
    assert_eq!(scan.failures[0].path, missing);
    assert!(matches!(scan.failures[0].error, SyncError::LocalRead { .. }));
}

#[cfg(unix)]
#[test]
fn scanner_reports_dangling_symlink() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("real.txt"), "real").unwrap();
    let link = dir.path().join("broken.txt");
    std::os::unix::fs::symlink(dir.path().join("nowhere"), &link).unwrap();

    let scan = DirectoryScanner::new().scan(&[dir.path().to_path_buf()]);

    assert_eq!(scan.files.len(), 1);
    assert_eq!(scan.failures.len(), 1);
    assert_eq!(scan.failures[0].path, link);
}
