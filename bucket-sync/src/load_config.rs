/// `load_config` module: reads the optional YAML settings file and merges it with
/// command-line flags into the core [`SyncConfig`].
///
/// Precedence is flags, then file, then built-in defaults. Secrets never live
/// in this file; the B2 key is read from the environment by [`crate::b2`].
///
/// Accepted keys (all optional):
///
/// ```yaml
/// directories: [/srv/photos, /srv/scans]
/// force: false
/// upload_concurrency: 1
/// delete_concurrency: 4
/// api_url: https://api.backblazeb2.com
/// retry:
///   max_retries: 3
///   base_delay_ms: 1000
/// ```
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{bail, Context, Result};
use bucket_sync_core::config::{SyncConfig, DEFAULT_DELETE_CONCURRENCY, DEFAULT_UPLOAD_CONCURRENCY};
use bucket_sync_core::retry::RetryPolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    #[serde(default)]
    pub force: bool,
    pub upload_concurrency: Option<usize>,
    pub delete_concurrency: Option<usize>,
    pub api_url: Option<String>,
    #[serde(default)]
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    pub max_retries: Option<u32>,
    pub base_delay_ms: Option<u64>,
}

impl RetrySection {
    fn to_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(default.max_retries),
            base_delay: self
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default.base_delay),
        }
    }
}

impl Settings {
    /// Combine file settings with flags. Flag directories replace file ones;
    /// with neither, the current working directory is used.
    pub fn into_sync_config(
        self,
        bucket: String,
        cli_dirs: Vec<PathBuf>,
        force: bool,
    ) -> Result<SyncConfig> {
        let directories = if !cli_dirs.is_empty() {
            cli_dirs
        } else if !self.directories.is_empty() {
            self.directories
        } else {
            vec![std::env::current_dir().context("cannot determine current directory")?]
        };

        let upload_concurrency = self.upload_concurrency.unwrap_or(DEFAULT_UPLOAD_CONCURRENCY);
        let delete_concurrency = self.delete_concurrency.unwrap_or(DEFAULT_DELETE_CONCURRENCY);
        if upload_concurrency == 0 {
            bail!("upload_concurrency must be at least 1");
        }
        if delete_concurrency == 0 {
            bail!("delete_concurrency must be at least 1");
        }

        Ok(SyncConfig {
            bucket,
            directories,
            force: force || self.force,
            upload_concurrency,
            delete_concurrency,
            retry: self.retry.to_policy(),
        })
    }
}

/// Loads a YAML settings file. No secrets are read here.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid, all-defaults config.
    if config_content.trim().is_empty() {
        info!(config_path = ?path_ref, "Config file is empty, using defaults");
        return Ok(Settings::default());
    }

    match serde_yaml::from_str::<Settings>(&config_content) {
        Ok(settings) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(settings)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let settings = Settings {
            directories: vec![PathBuf::from("/from/file")],
            upload_concurrency: Some(8),
            ..Default::default()
        };
        let config = settings
            .into_sync_config("b".into(), vec![PathBuf::from("/from/flag")], true)
            .unwrap();
        assert_eq!(config.directories, vec![PathBuf::from("/from/flag")]);
        assert_eq!(config.upload_concurrency, 8);
        assert_eq!(config.delete_concurrency, DEFAULT_DELETE_CONCURRENCY);
        assert!(config.force);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let settings = Settings {
            delete_concurrency: Some(0),
            ..Default::default()
        };
        let err = settings
            .into_sync_config("b".into(), vec![PathBuf::from("/x")], false)
            .unwrap_err();
        assert!(err.to_string().contains("delete_concurrency"));
    }

    #[test]
    fn retry_section_fills_missing_values_from_defaults() {
        let section = RetrySection {
            max_retries: None,
            base_delay_ms: Some(250),
        };
        let policy = section.to_policy();
        assert_eq!(policy.max_retries, RetryPolicy::default().max_retries);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
    }
}
