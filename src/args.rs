use crate::config::{RangeFallback, Settings};
use clap::Parser;
use std::path::PathBuf;

/// A parallel range-based file downloader.
///
/// Splits each resource into byte ranges, fetches them concurrently and
/// merges them, in order, into a single file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download, one after another.
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Number of sections to split each download into.
    #[arg(short = 'n', long)]
    pub sections: Option<u64>,

    /// Filename to use when the server does not suggest one.
    /// Defaults to the last segment of the URL.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Directory for section artifacts.
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Directory the merged file is published to.
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum number of sections fetched at the same time.
    #[arg(short = 'c', long)]
    pub max_in_flight: Option<usize>,

    /// Extra attempts per section after a failure.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Pause between attempts, in milliseconds.
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,

    /// Fetch as a single section when the server does not advertise byte ranges.
    #[arg(long)]
    pub fallback_single_stream: bool,

    /// Stop the remaining sections as soon as one fails.
    #[arg(long)]
    pub fail_fast: bool,

    /// Remove section artifacts after a successful merge.
    #[arg(long)]
    pub clean: bool,

    /// Path to a JSON settings file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Disable progress bars.
    #[arg(long)]
    pub no_progress: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Layers command-line flags over `settings`.
    pub fn apply(&self, settings: &Settings) -> Settings {
        Settings {
            sections: self.sections.or(settings.sections),
            tmp_dir: self.tmp_dir.clone().or_else(|| settings.tmp_dir.clone()),
            export_dir: self
                .export_dir
                .clone()
                .or_else(|| settings.export_dir.clone()),
            user_agent: settings.user_agent.clone(),
            request_timeout_secs: self.timeout.or(settings.request_timeout_secs),
            max_in_flight: self.max_in_flight.or(settings.max_in_flight),
            retries: self.retries.or(settings.retries),
            retry_delay_ms: self.retry_delay_ms.or(settings.retry_delay_ms),
            range_fallback: if self.fallback_single_stream {
                Some(RangeFallback::SingleStream)
            } else {
                settings.range_fallback
            },
            cancel_on_failure: if self.fail_fast {
                Some(true)
            } else {
                settings.cancel_on_failure
            },
            keep_sections: if self.clean {
                Some(false)
            } else {
                settings.keep_sections
            },
        }
    }
}
