//! Non-recursive enumeration of local directories into hashed [`LocalFile`]s.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::contract::LocalEnumerator;
use crate::error::SyncError;
use crate::file::LocalFile;

/// Result of scanning a set of directories.
#[derive(Debug, Default)]
pub struct LocalScan {
    /// Hashed files, directory by directory, sorted by name within each.
    pub files: Vec<LocalFile>,
    /// Entries and directories that could not be read. Never fatal.
    pub failures: Vec<ScanFailure>,
}

/// A directory or file that was skipped because it could not be read.
#[derive(Debug)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub error: SyncError,
}

/// The default [`LocalEnumerator`]: regular files directly inside each
/// directory, skipping dotfiles and subdirectories.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryScanner;

impl DirectoryScanner {
    pub fn new() -> Self {
        DirectoryScanner
    }

    fn scan_directory(&self, dir: &Path, scan: &mut LocalScan) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(source) => {
                warn!(path = %dir.display(), error = %source, "Skipping unreadable directory");
                scan.failures.push(ScanFailure {
                    path: dir.to_path_buf(),
                    error: SyncError::LocalRead {
                        path: dir.to_path_buf(),
                        source,
                    },
                });
                return;
            }
        };

        let mut names: Vec<_> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.file_name()),
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Failed to read directory entry");
                    None
                }
            })
            .filter(|name| !name.to_string_lossy().starts_with('.'))
            .collect();
        names.sort();

        let before = scan.files.len();
        for name in names {
            let path = dir.join(&name);
            // Follows symlinks: a link to a directory is skipped like the directory itself.
            match fs::metadata(&path) {
                Ok(meta) if meta.is_dir() => {
                    debug!(path = %path.display(), "Skipping subdirectory");
                    continue;
                }
                Ok(meta) if !meta.is_file() => {
                    debug!(path = %path.display(), "Skipping non-regular file");
                    continue;
                }
                Ok(_) => {}
                Err(source) => {
                    warn!(path = %path.display(), error = %source, "Skipping unreadable entry");
                    scan.failures.push(ScanFailure {
                        path: path.clone(),
                        error: SyncError::LocalRead { path, source },
                    });
                    continue;
                }
            }

            match LocalFile::open(&path) {
                Ok(file) => {
                    debug!(path = %path.display(), hash = file.hash(), "Hashed local file");
                    scan.files.push(file);
                }
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Skipping file that could not be hashed");
                    scan.failures.push(ScanFailure { path, error });
                }
            }
        }
        info!(
            path = %dir.display(),
            files = scan.files.len() - before,
            "Scanned local directory"
        );
    }
}

impl LocalEnumerator for DirectoryScanner {
    fn scan(&self, directories: &[PathBuf]) -> LocalScan {
        let mut scan = LocalScan::default();
        for dir in directories {
            self.scan_directory(dir, &mut scan);
        }
        scan
    }
}
