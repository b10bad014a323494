//! Download configuration and the optional JSON settings file.
//!
//! [`Settings`] mirrors the file on disk, every field optional.
//! [`DownloadConfig`] is the resolved, immutable view the pipeline runs with.
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_SECTIONS: u64 = 10;
/// Upper bound on the sections a single download may be split into.
pub const MAX_SECTIONS: u64 = 1024;
pub const DEFAULT_TMP_DIR: &str = "tmp";
pub const DEFAULT_EXPORT_DIR: &str = "exports";
pub const DEFAULT_SETTINGS_FILE: &str = "splitdl.json";
pub const SETTINGS_ENV: &str = "SPLITDL_CONFIG";

pub fn default_user_agent() -> String {
    format!("splitdl/{}", env!("CARGO_PKG_VERSION"))
}

/// What to do when the server does not advertise byte-range support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeFallback {
    /// Abort with [`crate::DownloadError::RangeUnsupported`].
    #[default]
    Fail,
    /// Fetch the whole resource as a single section.
    SingleStream,
}

/// How often a single section fetch is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_secs(2),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Requested number of sections; clamped to the resource size.
    pub sections: u64,
    /// Where section artifacts are written.
    pub tmp_dir: PathBuf,
    /// Where the merged file is published.
    pub export_dir: PathBuf,
    pub user_agent: String,
    /// Per-request deadline. `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Cap on simultaneous section requests. `None` starts all at once.
    pub max_in_flight: Option<usize>,
    pub retry: RetryPolicy,
    pub range_fallback: RangeFallback,
    /// Stop the remaining sections as soon as one fails. The reported error
    /// is then whichever real failure was observed before the rest stopped.
    pub cancel_on_failure: bool,
    /// Leave section artifacts on disk after a successful merge.
    pub keep_sections: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            sections: DEFAULT_SECTIONS,
            tmp_dir: PathBuf::from(DEFAULT_TMP_DIR),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            user_agent: default_user_agent(),
            request_timeout: None,
            max_in_flight: None,
            retry: RetryPolicy::none(),
            range_fallback: RangeFallback::Fail,
            cancel_on_failure: false,
            keep_sections: true,
        }
    }
}

impl DownloadConfig {
    /// Builds the shared HTTP client for this configuration.
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(&self.user_agent);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        builder.build()
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Contents of the optional settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub sections: Option<u64>,
    pub tmp_dir: Option<PathBuf>,
    pub export_dir: Option<PathBuf>,
    pub user_agent: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub max_in_flight: Option<usize>,
    pub retries: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub range_fallback: Option<RangeFallback>,
    pub cancel_on_failure: Option<bool>,
    pub keep_sections: Option<bool>,
}

impl Settings {
    /// Loads settings from `explicit`, else `$SPLITDL_CONFIG`, else
    /// `./splitdl.json`.
    ///
    /// An explicitly named file must exist; the implicit default may be absent,
    /// in which case empty settings are returned.
    pub fn load(explicit: Option<&Path>) -> Result<Self, SettingsError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Self::from_file(Path::new(&path));
        }

        match Self::from_file(Path::new(DEFAULT_SETTINGS_FILE)) {
            Err(SettingsError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies these settings on top of the built-in defaults.
    pub fn resolve(&self) -> DownloadConfig {
        let defaults = DownloadConfig::default();
        DownloadConfig {
            sections: self.sections.unwrap_or(defaults.sections),
            tmp_dir: self.tmp_dir.clone().unwrap_or(defaults.tmp_dir),
            export_dir: self.export_dir.clone().unwrap_or(defaults.export_dir),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .or(defaults.request_timeout),
            max_in_flight: self.max_in_flight.or(defaults.max_in_flight),
            retry: RetryPolicy {
                max_attempts: self
                    .retries
                    .map_or(defaults.retry.max_attempts, |r| r.saturating_add(1)),
                delay: self
                    .retry_delay_ms
                    .map_or(defaults.retry.delay, Duration::from_millis),
            },
            range_fallback: self.range_fallback.unwrap_or(defaults.range_fallback),
            cancel_on_failure: self.cancel_on_failure.unwrap_or(defaults.cancel_on_failure),
            keep_sections: self.keep_sections.unwrap_or(defaults.keep_sections),
        }
    }
}
