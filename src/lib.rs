//! # splitdl
//!
//! `splitdl` downloads a single remote resource by splitting it into byte
//! ranges, fetching the ranges concurrently and merging them, in order, into
//! one file.
//!
//! The pipeline:
//! - [`probe`] asks the server for the resource length and range support.
//! - [`plan::partition`] splits that length into contiguous sections.
//! - [`coordinator::fetch_all`] runs one [`SectionFetcher`] call per section,
//!   bounded and cancellable.
//! - [`merge::merge_sections`] concatenates the section artifacts through a
//!   staging file and renames it into place.
//!
//! [`Downloader`] wires these together.

pub mod args;
pub mod config;
pub mod coordinator;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod merge;
pub mod observer;
pub mod plan;
pub mod probe;
pub mod utils;
pub mod worker;

pub use args::Args;
pub use config::{DownloadConfig, RangeFallback, RetryPolicy, Settings};
pub use downloader::{DownloadReport, DownloadRequest, Downloader};
pub use error::DownloadError;
pub use plan::{ByteRange, PartitionPlan};
pub use probe::{ProbeResult, probe};
pub use worker::{FetchResult, HttpFetcher, SectionFetcher};
