//! Concurrent fan-out of section fetches.
use crate::error::{DownloadError, Result};
use crate::plan::PartitionPlan;
use crate::worker::{FetchResult, SectionFetcher};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runs one fetch per section of `plan` and waits for all of them.
///
/// At most `max_in_flight` fetches run at once (`None` starts every section
/// immediately). Cancelling `cancel` stops the whole batch. Otherwise every
/// section runs to completion, unless `cancel_on_failure` is set, in which
/// case the first failure cancels the fetches still pending.
///
/// On success the results are returned in plan order. On failure the error of
/// the lowest-indexed section that failed for a reason other than
/// cancellation is returned, or [`DownloadError::Cancelled`] if nothing else
/// went wrong. Without `cancel_on_failure` that choice does not depend on
/// completion order.
pub async fn fetch_all<F: SectionFetcher>(
    plan: &PartitionPlan,
    fetcher: Arc<F>,
    max_in_flight: Option<usize>,
    cancel_on_failure: bool,
    cancel: CancellationToken,
) -> Result<Vec<FetchResult>> {
    let sections = plan.len();
    let permits = max_in_flight.unwrap_or(sections).clamp(1, sections.max(1));
    let semaphore = Arc::new(Semaphore::new(permits));
    // Cancelling this child stops the siblings without touching the caller's token.
    let abort = cancel.child_token();

    info!(sections, permits, cancel_on_failure, "Fetching sections");

    let mut tasks = Vec::with_capacity(sections);
    for range in plan.iter().copied() {
        let fetcher = fetcher.clone();
        let semaphore = semaphore.clone();
        let abort = abort.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = tokio::select! {
                biased;
                _ = abort.cancelled() => return Err(DownloadError::Cancelled),
                permit = semaphore.acquire_owned() => {
                    permit.map_err(|_| DownloadError::Cancelled)?
                }
            };

            let result = fetcher.fetch(range, abort.clone()).await;
            if let Err(e) = &result
                && !e.is_cancelled()
            {
                error!(index = range.index, error = %e, "Section failed");
                if cancel_on_failure {
                    abort.cancel();
                }
            }
            result
        }));
    }

    let mut fetched = Vec::with_capacity(sections);
    let mut failure: Option<DownloadError> = None;

    for (index, joined) in join_all(tasks).await.into_iter().enumerate() {
        let outcome = joined
            .map_err(|e| DownloadError::TaskFailed(format!("section {index}: {e}")))
            .and_then(|result| result);

        match outcome {
            Ok(result) => fetched.push(result),
            Err(e) => {
                let replace = match &failure {
                    None => true,
                    Some(current) => current.is_cancelled() && !e.is_cancelled(),
                };
                if replace {
                    failure = Some(e);
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    fetched.sort_by_key(|r| r.index);
    debug!(sections = fetched.len(), "All sections fetched");
    Ok(fetched)
}
