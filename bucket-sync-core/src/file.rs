//! Content-hashed file entities, local and remote.
//!
//! Both kinds share the read-only [`FileEntity`] contract: a location, an
//! optional content hash and the names derived from the location. They differ
//! only in how the hash is obtained. A [`LocalFile`] hashes its bytes once on
//! construction; a [`RemoteFile`] reads whatever hash the listing metadata
//! carries and may have none.

use regex::Regex;
use sha1::{Digest, Sha1};
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::contract::ObjectRecord;
use crate::error::SyncError;

/// Upper bound on the length of a generated upload name.
pub const MAX_SANITIZED_LEN: usize = 200;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Shared, read-only view of a named file with a content fingerprint.
pub trait FileEntity {
    /// Local path or remote object name.
    fn location(&self) -> Cow<'_, str>;

    /// Lowercase hex SHA-1, or `None` when the hash is unknown.
    fn content_hash(&self) -> Option<&str>;

    /// Basename portion of the location, extension included.
    fn filename(&self) -> String {
        basename(&self.location()).to_string()
    }

    /// Filename made safe for use as an upload target name.
    fn sanitized_filename(&self) -> String {
        sanitize_filename(&self.filename())
    }
}

/// Last `/`-separated component of a location, ignoring trailing separators.
pub fn basename(location: &str) -> &str {
    let trimmed = location.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn whitespace_runs() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\t\n\x0B\x0C\r ]+").expect("whitespace pattern is valid"))
}

fn disallowed_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[^a-zA-Z0-9\-_.+&()#\t\n\x0B\x0C\r ]")
            .expect("character filter pattern is valid")
    })
}

/// Collapse ASCII whitespace runs to `_`, drop characters outside
/// `[A-Za-z0-9-_.+&()#]`, then keep the first 200 characters.
///
/// Only ASCII whitespace counts as a separator. Unicode spaces such as
/// U+00A0 or U+2003 are dropped like any other non-ASCII character.
///
/// The output format is relied upon by objects already stored in buckets, so
/// the three steps must stay in this order.
pub fn sanitize_filename(filename: &str) -> String {
    let collapsed = whitespace_runs().replace_all(filename, "_");
    let filtered = disallowed_chars().replace_all(&collapsed, "");
    filtered.chars().take(MAX_SANITIZED_LEN).collect()
}

/// SHA-1 of everything readable at `path`, as lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// A file on the local machine, hashed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    path: PathBuf,
    content_hash: String,
}

impl LocalFile {
    /// Hash the file at `path`. Fails if it cannot be opened or read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        match hash_file(&path) {
            Ok(content_hash) => Ok(LocalFile { path, content_hash }),
            Err(source) => Err(SyncError::LocalRead { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The content hash; always present for local files.
    pub fn hash(&self) -> &str {
        &self.content_hash
    }
}

impl FileEntity for LocalFile {
    fn location(&self) -> Cow<'_, str> {
        self.path.to_string_lossy()
    }

    fn content_hash(&self) -> Option<&str> {
        Some(&self.content_hash)
    }

    fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// An object stored in the bucket, built from its listing record.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    record: ObjectRecord,
    content_hash: Option<String>,
}

impl RemoteFile {
    pub fn from_record(record: ObjectRecord) -> Self {
        let content_hash = extract_hash(&record);
        RemoteFile {
            record,
            content_hash,
        }
    }

    pub fn name(&self) -> &str {
        &self.record.file_name
    }

    /// Identifier of the stored version, required to delete it.
    pub fn version_id(&self) -> &str {
        &self.record.file_id
    }

    pub fn record(&self) -> &ObjectRecord {
        &self.record
    }

    /// Look up a field of the listing record by dotted path, e.g. `fileInfo.sha1`.
    pub fn raw(&self, key: &str) -> Option<serde_json::Value> {
        let mut value = serde_json::to_value(&self.record).ok()?;
        for part in key.split('.') {
            value = value.as_object_mut()?.remove(part)?;
        }
        Some(value)
    }
}

impl FileEntity for RemoteFile {
    fn location(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.record.file_name)
    }

    fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }
}

/// Prefer the storage-computed hash, fall back to the `sha1` custom info.
fn extract_hash(record: &ObjectRecord) -> Option<String> {
    record
        .content_sha1
        .as_deref()
        .and_then(normalise_hash)
        .or_else(|| {
            record
                .file_info
                .get("sha1")
                .and_then(serde_json::Value::as_str)
                .and_then(normalise_hash)
        })
}

/// Large files report `none`; hashes supplied after the body carry an `unverified:` prefix.
fn normalise_hash(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix("unverified:").unwrap_or(trimmed);
    if hex.is_empty() || hex.eq_ignore_ascii_case("none") {
        None
    } else {
        Some(hex.to_ascii_lowercase())
    }
}
