use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{MultiProgress, ProgressDrawTarget};
use splitdl::observer::ConsoleProgress;
use splitdl::{Args, DownloadRequest, Downloader, Settings, logging};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose)?;

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let config = args.apply(&settings).resolve();

    if args.output.is_some() && args.urls.len() > 1 {
        warn!("--output applies to every URL; later downloads may replace earlier ones");
    }

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling downloads");
            signal_token.cancel();
        }
    });

    let mut downloader = Downloader::new(config.clone()).context("Failed to build HTTP client")?;
    if !args.no_progress && std::io::stderr().is_terminal() {
        let multi_progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        downloader = downloader.with_observers(Arc::new(ConsoleProgress::new(multi_progress)));
    }

    let start_time = Instant::now();

    for url in &args.urls {
        let request = match &args.output {
            Some(name) => DownloadRequest::new(url.as_str(), config.sections, name.as_str()),
            None => DownloadRequest::from_url(url.as_str(), config.sections),
        }?;

        let started = Instant::now();
        let report = downloader
            .download(&request, cancel_token.clone())
            .await
            .with_context(|| format!("An error occurred while downloading {url}"))?;

        info!(
            path = %report.path.display(),
            bytes = report.total_size,
            sections = report.sections,
            "Download completed for {} in {:.2} seconds",
            url,
            started.elapsed().as_secs_f64()
        );
    }

    info!(
        "Total of {} download(s) completed in {:.2} seconds",
        args.urls.len(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
