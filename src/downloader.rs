// src/downloader.rs
use crate::config::{DownloadConfig, MAX_SECTIONS, RangeFallback};
use crate::coordinator::fetch_all;
use crate::error::{DownloadError, Result};
use crate::merge;
use crate::observer::{ObserverFactory, SilentObserver};
use crate::plan::{self, PartitionPlan};
use crate::probe::probe;
use crate::utils;
use crate::worker::{FetchResult, HttpFetcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

/// One resource to fetch, validated up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
    sections: u64,
    default_filename: String,
}

impl DownloadRequest {
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidRequest`] if `url` is not an absolute
    /// http(s) URL, `sections` is zero or above [`MAX_SECTIONS`], or
    /// `default_filename` is empty.
    pub fn new(
        url: impl Into<String>,
        sections: u64,
        default_filename: impl Into<String>,
    ) -> Result<Self> {
        let url = url.into();
        let parsed =
            Url::parse(&url).map_err(|e| DownloadError::InvalidRequest(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidRequest(format!(
                "unsupported scheme {:?}",
                parsed.scheme()
            )));
        }
        if sections == 0 {
            return Err(DownloadError::InvalidRequest(
                "number of sections must be greater than 0".into(),
            ));
        }
        if sections > MAX_SECTIONS {
            return Err(DownloadError::InvalidRequest(format!(
                "number of sections must not exceed {MAX_SECTIONS}"
            )));
        }
        let default_filename = default_filename.into();
        if default_filename.trim().is_empty() {
            return Err(DownloadError::InvalidRequest(
                "default filename must not be empty".into(),
            ));
        }

        Ok(Self {
            url,
            sections,
            default_filename,
        })
    }

    /// A request named after the last segment of its URL.
    pub fn from_url(url: impl Into<String>, sections: u64) -> Result<Self> {
        let url = url.into();
        let filename = utils::get_filename_from_url(&url);
        Self::new(url, sections, filename)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sections(&self) -> u64 {
        self.sections
    }

    pub fn default_filename(&self) -> &str {
        &self.default_filename
    }
}

/// Summary of a finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    /// Where the merged file was published.
    pub path: PathBuf,
    pub filename: String,
    pub total_size: u64,
    /// Number of sections actually fetched (zero for an empty resource).
    pub sections: usize,
}

/// Picks the filename hint of the lowest-indexed section that carried one,
/// falling back to `default`.
///
/// Independent of the order in which sections completed.
pub fn resolve_filename(results: &[FetchResult], default: &str) -> String {
    results
        .iter()
        .filter_map(|r| r.filename_hint.as_deref().map(|hint| (r.index, hint)))
        .min_by_key(|(index, _)| *index)
        .map_or_else(|| default.to_string(), |(_, hint)| hint.to_string())
}

/// Probes, partitions, fetches and merges a resource.
pub struct Downloader {
    client: reqwest::Client,
    config: DownloadConfig,
    observers: Arc<dyn ObserverFactory>,
}

impl Downloader {
    /// Builds a downloader with a client configured from `config`.
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = config.build_client()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: DownloadConfig) -> Self {
        Self {
            client,
            config,
            observers: Arc::new(SilentObserver),
        }
    }

    pub fn with_observers(mut self, observers: Arc<dyn ObserverFactory>) -> Self {
        self.observers = observers;
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Runs the whole pipeline for `request`.
    ///
    /// Nothing is fetched if the probe fails, and nothing is published unless
    /// every section was fetched and merged.
    pub async fn download(
        &self,
        request: &DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<DownloadReport> {
        let url = request.url();
        let probed = probe(url, &self.client).await?;
        info!(size = probed.total_size, "Measured size");

        create_dir(&self.config.export_dir).await?;

        if probed.total_size == 0 {
            let filename = request.default_filename().to_string();
            let path = self.config.export_dir.join(&filename);
            merge::publish_empty(&path).await?;
            info!(path = %path.display(), "Resource is empty, published empty file");
            return Ok(DownloadReport {
                path,
                filename,
                total_size: 0,
                sections: 0,
            });
        }

        let plan = self.plan(probed.total_size, probed.supports_range, request.sections())?;
        info!(
            sections = plan.len(),
            ranges = ?plan.iter().map(|r| (r.start, r.end)).collect::<Vec<_>>(),
            "Computed partitions"
        );

        create_dir(&self.config.tmp_dir).await?;

        let fetcher = HttpFetcher::new(self.client.clone(), url, &self.config.tmp_dir)
            .with_retry(self.config.retry)
            .expect_partial(plan.len() > 1)
            .with_observers(self.observers.clone());
        let results = fetch_all(
            &plan,
            Arc::new(fetcher),
            self.config.max_in_flight,
            self.config.cancel_on_failure,
            cancel,
        )
        .await?;

        let filename = resolve_filename(&results, request.default_filename());
        let path = self.config.export_dir.join(&filename);
        let total_size = merge::merge_sections(&plan, &results, &path).await?;

        if !self.config.keep_sections {
            discard_sections(&plan, &self.config.tmp_dir).await;
        }

        Ok(DownloadReport {
            path,
            filename,
            total_size,
            sections: plan.len(),
        })
    }

    fn plan(&self, total_size: u64, supports_range: bool, sections: u64) -> Result<PartitionPlan> {
        let plan = plan::partition(total_size, sections)?;
        if supports_range || plan.len() == 1 {
            return Ok(plan);
        }

        match self.config.range_fallback {
            RangeFallback::Fail => Err(DownloadError::RangeUnsupported),
            RangeFallback::SingleStream => {
                warn!("Server does not advertise byte ranges, fetching as a single section");
                plan::whole(total_size)
            }
        }
    }
}

/// Removes section artifacts once the merged file is published. Leftovers are
/// logged, not reported, since the download itself has succeeded.
async fn discard_sections(plan: &PartitionPlan, tmp_dir: &Path) {
    if let Err(e) = utils::purge_sections(plan, tmp_dir).await {
        warn!(error = %e, "Could not remove section artifacts");
    }
}

async fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| DownloadError::persistence(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn result(index: usize, hint: Option<&str>) -> FetchResult {
        FetchResult {
            index,
            path: PathBuf::from(format!("section-{index}.tmp")),
            bytes_written: 1,
            filename_hint: hint.map(str::to_string),
        }
    }

    #[test]
    fn test_resolve_filename_prefers_lowest_index() {
        // Completion order: section 2 first, then section 1.
        let results = vec![
            result(2, Some("b.jpg")),
            result(0, None),
            result(1, Some("a.jpg")),
        ];
        assert_eq!(resolve_filename(&results, "final.jpg"), "a.jpg");
    }

    #[test]
    fn test_resolve_filename_falls_back_to_default() {
        let results = vec![result(0, None), result(1, None)];
        assert_eq!(resolve_filename(&results, "final.jpg"), "final.jpg");
    }

    #[test]
    fn test_request_validation() {
        assert!(DownloadRequest::new("https://example.com/a.bin", 4, "a.bin").is_ok());
        assert!(matches!(
            DownloadRequest::new("not a url", 4, "a.bin"),
            Err(DownloadError::InvalidRequest(_))
        ));
        assert!(matches!(
            DownloadRequest::new("ftp://example.com/a.bin", 4, "a.bin"),
            Err(DownloadError::InvalidRequest(_))
        ));
        assert!(matches!(
            DownloadRequest::new("https://example.com/a.bin", 0, "a.bin"),
            Err(DownloadError::InvalidRequest(_))
        ));
        assert!(DownloadRequest::new("https://example.com/a.bin", MAX_SECTIONS, "a.bin").is_ok());
        assert!(matches!(
            DownloadRequest::new("https://example.com/a.bin", u64::MAX, "a.bin"),
            Err(DownloadError::InvalidRequest(_))
        ));
        assert!(matches!(
            DownloadRequest::new("https://example.com/a.bin", 4, "  "),
            Err(DownloadError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_from_url_names_file() {
        let request = DownloadRequest::from_url("https://example.com/files/photo.jpg?w=10", 3)
            .unwrap();
        assert_eq!(request.default_filename(), "photo.jpg");
        assert_eq!(request.sections(), 3);
    }

    #[test]
    fn test_plan_respects_range_fallback() {
        let strict = Downloader::with_client(reqwest::Client::new(), DownloadConfig::default());
        assert!(matches!(
            strict.plan(100, false, 4),
            Err(DownloadError::RangeUnsupported)
        ));
        assert_eq!(strict.plan(100, false, 1).unwrap().len(), 1);
        assert_eq!(strict.plan(100, true, 4).unwrap().len(), 4);

        let lenient = Downloader::with_client(
            reqwest::Client::new(),
            DownloadConfig {
                range_fallback: RangeFallback::SingleStream,
                ..DownloadConfig::default()
            },
        );
        let plan = lenient.plan(100, false, 4).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].end, 99);
    }

    #[tokio::test]
    async fn test_discard_sections_tolerates_leftovers() {
        let dir = tempdir().unwrap();
        let plan = plan::partition(10, 2).unwrap();
        fs::create_dir(utils::section_path(dir.path(), 0)).await.unwrap();
        fs::write(utils::section_path(dir.path(), 1), b"fghij")
            .await
            .unwrap();

        discard_sections(&plan, dir.path()).await;

        assert!(utils::section_path(dir.path(), 0).is_dir());
        assert!(!utils::section_path(dir.path(), 1).exists());
    }
}
