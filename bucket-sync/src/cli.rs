///
/// This module implements the CLI for bucket-sync: argument parsing, the
/// argument-order check, the async `run` entrypoint, the printed summary and
/// the mapping from failures to process exit codes.
///
/// All reconciliation logic lives in the [`bucket-sync-core`] crate. This
/// module only wires flags, the settings file and the B2 client into it.
///
/// ## How To Use
/// - For command-line users: `bucket-sync [-d|--dir <DIR>]... [--config <FILE>] [--force] <BUCKET>`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`],
///   or [`execute`] with any [`RemoteStorage`].
///
/// [`bucket-sync-core`]: ../../bucket-sync-core/
use crate::b2::{B2Client, B2Credentials};
use crate::load_config::{load_config, Settings};
use anyhow::{Context, Result};
use bucket_sync_core::config::SyncConfig;
use bucket_sync_core::contract::RemoteStorage;
use bucket_sync_core::error::SyncError;
use bucket_sync_core::local::DirectoryScanner;
use bucket_sync_core::reconcile::FailedOperation;
use bucket_sync_core::synchronise::{synchronise, SyncReport};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Exit status for failures that are neither usage errors nor listing failures.
pub const EXIT_FAILURE: i32 = 3;
/// Exit status when the bucket listing could not be obtained or parsed.
pub const EXIT_LISTING_FAILED: i32 = 4;

/// CLI for bucket-sync: upload local files to a B2 bucket, one copy per content.
#[derive(Parser, Debug)]
#[clap(
    name = "bucket-sync",
    version,
    about = "One-way sync of local directories to a Backblaze B2 bucket, deduplicated by content hash"
)]
pub struct Cli {
    /// Directory to sync files from. Repeatable; non-recursive. Defaults to the current directory.
    #[clap(short = 'd', long = "dir", value_name = "DIR")]
    pub dirs: Vec<PathBuf>,

    /// Optional YAML settings file
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Upload even when identical content is already in the bucket
    #[clap(long)]
    pub force: bool,

    /// Bucket to sync into; must come after all options
    #[clap(value_name = "BUCKET")]
    pub bucket: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("No bucket specified. Please provide bucket to sync with.")]
    MissingBucket,
    #[error("Options specified after bucket. Please specify bucket after all other options specified.")]
    OptionsAfterBucket,
}

impl UsageError {
    pub fn exit_code(&self) -> i32 {
        match self {
            UsageError::MissingBucket => 1,
            UsageError::OptionsAfterBucket => 2,
        }
    }
}

/// Reject options that follow the bucket name. `args` excludes the program name.
///
/// Help and version requests are never rejected.
pub fn check_argument_order<S: AsRef<str>>(args: &[S]) -> Result<(), UsageError> {
    if args
        .iter()
        .any(|a| matches!(a.as_ref(), "-h" | "--help" | "-V" | "--version"))
    {
        return Ok(());
    }

    let mut seen_bucket = false;
    let mut takes_value = false;
    for arg in args.iter().map(AsRef::as_ref) {
        if takes_value {
            takes_value = false;
            continue;
        }
        if arg == "--" {
            break;
        }
        if arg.starts_with('-') && arg.len() > 1 {
            if seen_bucket {
                return Err(UsageError::OptionsAfterBucket);
            }
            takes_value = matches!(arg, "-d" | "--dir" | "--config");
        } else {
            seen_bucket = true;
        }
    }
    Ok(())
}

/// Async CLI entrypoint for main() and integration tests.
pub async fn run(cli: Cli) -> Result<SyncReport> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let bucket = cli.bucket.ok_or(UsageError::MissingBucket)?;
    let settings = match &cli.config {
        Some(path) => load_config(path)?,
        None => Settings::default(),
    };
    let credentials = B2Credentials::from_env(settings.api_url.as_deref())?;
    let config = settings.into_sync_config(bucket, cli.dirs, cli.force)?;
    config.trace_loaded();

    let storage = B2Client::new(credentials)?;
    storage
        .resolve_bucket(&config.bucket)
        .await
        .with_context(|| format!("Bucket {} is not available", config.bucket))?;

    execute(&config, &storage, &mut std::io::stdout()).await
}

/// Run one synchronisation against `storage` and print the summary to `out`.
pub async fn execute<S, W>(config: &SyncConfig, storage: &S, out: &mut W) -> Result<SyncReport>
where
    S: RemoteStorage + ?Sized,
    W: Write,
{
    print_header(config, out)?;
    match synchronise(config, storage, Arc::new(DirectoryScanner::new())).await {
        Ok(report) => {
            tracing::info!(command = "sync", ?report, "Synchronisation complete");
            print_summary(&report, out)?;
            Ok(report)
        }
        Err(e) => {
            tracing::error!(command = "sync", error = %e, "Synchronisation failed");
            Err(e.into())
        }
    }
}

/// Exit status for a failed run.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(usage) = err.downcast_ref::<UsageError>() {
        return usage.exit_code();
    }
    match err.downcast_ref::<SyncError>() {
        Some(SyncError::RemoteListing { .. }) => EXIT_LISTING_FAILED,
        _ => EXIT_FAILURE,
    }
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

fn line<W: Write>(out: &mut W, label: &str, value: impl std::fmt::Display) -> std::io::Result<()> {
    writeln!(out, "{label:<20}: {value}")
}

fn print_header<W: Write>(config: &SyncConfig, out: &mut W) -> std::io::Result<()> {
    writeln!(out, "\nFile Sync to Backblaze B2\n")?;
    line(out, "Bucket", &config.bucket)?;
    for (i, dir) in config.directories.iter().enumerate() {
        line(out, if i == 0 { "Directories" } else { "" }, dir.display())?;
    }
    Ok(())
}

pub fn print_summary<W: Write>(report: &SyncReport, out: &mut W) -> std::io::Result<()> {
    line(out, "Files in bucket", group_thousands(report.remote_files))?;
    line(out, "Files in directory", group_thousands(report.local_files))?;
    line(out, "Files uploaded", group_thousands(report.uploaded))?;
    line(out, "Duplicates removed", group_thousands(report.deleted))?;
    if report.has_failures() {
        line(out, "Failures", group_thousands(report.failures.len()))?;
        for failure in &report.failures {
            let op = match failure.operation {
                FailedOperation::Scan => "read",
                FailedOperation::Upload => "upload",
                FailedOperation::Delete => "delete",
            };
            writeln!(out, "    {op:<7}{}: {}", failure.location, failure.message)?;
        }
    }
    writeln!(out)
}
