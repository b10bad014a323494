use crate::config::RetryPolicy;
use crate::error::{DownloadError, Result};
use crate::observer::{ObserverFactory, ProgressObserver, SilentObserver};
use crate::plan::ByteRange;
use crate::utils;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_DISPOSITION, RANGE};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one successful section fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Index of the section within its plan.
    pub index: usize,
    /// Artifact holding the section's bytes.
    pub path: PathBuf,
    pub bytes_written: u64,
    /// Filename advertised by the server's `Content-Disposition`, if any.
    pub filename_hint: Option<String>,
}

/// Retrieves one section and persists it to its own artifact.
///
/// Implementations must give up promptly with [`DownloadError::Cancelled`]
/// once `cancel` fires.
pub trait SectionFetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        range: ByteRange,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<FetchResult>> + Send;
}

/// Fetches sections of a single URL over HTTP with `Range` requests.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    tmp_dir: PathBuf,
    retry: RetryPolicy,
    partial: bool,
    observers: Arc<dyn ObserverFactory>,
}

impl HttpFetcher {
    /// A fetcher with no retries, no progress output, and `206` replies required.
    pub fn new(client: reqwest::Client, url: impl Into<String>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            url: url.into(),
            tmp_dir: tmp_dir.into(),
            retry: RetryPolicy::none(),
            partial: true,
            observers: Arc::new(SilentObserver),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Whether the server must answer with `206 Partial Content`. Only a plan
    /// with a single section covering the whole resource may accept `200 OK`.
    pub fn expect_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    pub fn with_observers(mut self, observers: Arc<dyn ObserverFactory>) -> Self {
        self.observers = observers;
        self
    }

    async fn fetch_once(
        &self,
        range: ByteRange,
        observer: &dyn ProgressObserver,
    ) -> Result<FetchResult> {
        let mut response = self
            .client
            .get(&self.url)
            .header(RANGE, range.header_value())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                code: status.as_u16(),
            });
        }
        if self.partial && status != StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::RangeUnsupported);
        }

        let filename_hint = match response.headers().get(CONTENT_DISPOSITION) {
            Some(value) => {
                let value = value.to_str().map_err(|_| {
                    DownloadError::FilenameResolution(
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })?;
                utils::filename_from_disposition(value)?
            }
            None => None,
        };
        debug!(
            index = range.index,
            hint = filename_hint.as_deref(),
            "Section response received"
        );

        let path = utils::section_path(&self.tmp_dir, range.index);
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| DownloadError::persistence(&path, e))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0u64;

        while let Some(bytes) = response.chunk().await? {
            writer
                .write_all(&bytes)
                .await
                .map_err(|e| DownloadError::persistence(&path, e))?;
            written += bytes.len() as u64;
            observer.inc(bytes.len() as u64);
        }

        // Ensure all bytes are flushed to disk before reporting success
        writer
            .flush()
            .await
            .map_err(|e| DownloadError::persistence(&path, e))?;

        if written != range.len() {
            return Err(DownloadError::LengthMismatch {
                index: range.index,
                expected: range.len(),
                actual: written,
            });
        }

        info!(
            index = range.index,
            start = range.start,
            end = range.end,
            bytes = written,
            "Section written"
        );
        Ok(FetchResult {
            index: range.index,
            path,
            bytes_written: written,
            filename_hint,
        })
    }
}

/// Transport failures, short bodies and transient statuses (5xx, 408, 429).
fn is_retryable(err: &DownloadError) -> bool {
    match err {
        DownloadError::Transport(_) | DownloadError::LengthMismatch { .. } => true,
        DownloadError::HttpStatus { code } => *code >= 500 || matches!(*code, 408 | 429),
        _ => false,
    }
}

impl SectionFetcher for HttpFetcher {
    /// Downloads a single section with buffered writing, retrying per the
    /// configured [`RetryPolicy`].
    async fn fetch(&self, range: ByteRange, cancel: CancellationToken) -> Result<FetchResult> {
        let observer = self.observers.section(range.index, range.len());
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                observer.message(format!("Part {} retry #{}", range.index + 1, attempt));
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DownloadError::Cancelled),
                result = self.fetch_once(range, observer.as_ref()) => result,
            };

            match result {
                Ok(fetched) => {
                    observer.finish();
                    return Ok(fetched);
                }
                Err(e) if attempt < self.retry.max_attempts && is_retryable(&e) => {
                    warn!(
                        index = range.index,
                        attempt,
                        error = %e,
                        delay_ms = self.retry.delay.as_millis() as u64,
                        "Section failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            observer.finish();
                            return Err(DownloadError::Cancelled);
                        }
                        _ = sleep(self.retry.delay) => {}
                    }
                }
                Err(e) => {
                    observer.message(format!("Part {} failed: {}", range.index + 1, e));
                    observer.finish();
                    return Err(e);
                }
            }
        }
    }
}
