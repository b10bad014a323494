//! Ordered concatenation of section artifacts into the published file.
use crate::error::{DownloadError, Result};
use crate::plan::PartitionPlan;
use crate::worker::FetchResult;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Longest file name, in bytes, common filesystems accept.
const MAX_NAME_LEN: usize = 255;
const STAGING_SUFFIX: &str = ".part";

/// Staging path used while `destination` is being assembled.
///
/// The name is `.<name>.part`, with `<name>` cut at a character boundary so
/// the whole stays within [`MAX_NAME_LEN`] bytes.
pub fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut cut = name.len().min(MAX_NAME_LEN - 1 - STAGING_SUFFIX.len());
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    destination.with_file_name(format!(".{}{STAGING_SUFFIX}", &name[..cut]))
}

/// Concatenates the artifacts of `results` in plan order into `destination`.
///
/// Bytes are written to [`staging_path`] first and renamed over `destination`
/// only once every section has been copied and synced, so the published path
/// never holds a partial file. Returns the number of bytes merged.
///
/// # Errors
///
/// * [`DownloadError::Persistence`] if an artifact is missing or unreadable,
///   or the destination cannot be written.
/// * [`DownloadError::LengthMismatch`] if an artifact does not match its range.
pub async fn merge_sections(
    plan: &PartitionPlan,
    results: &[FetchResult],
    destination: &Path,
) -> Result<u64> {
    let staging = staging_path(destination);
    match assemble(plan, results, &staging).await {
        Ok(total) => {
            publish(&staging, destination).await?;
            info!(path = %destination.display(), bytes = total, "Merge complete");
            Ok(total)
        }
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&staging).await
                && cleanup.kind() != io::ErrorKind::NotFound
            {
                warn!(path = %staging.display(), error = %cleanup, "Could not remove staging file");
            }
            Err(e)
        }
    }
}

/// Publishes an empty file at `destination`, for zero-length resources.
pub async fn publish_empty(destination: &Path) -> Result<()> {
    let staging = staging_path(destination);
    let file = File::create(&staging)
        .await
        .map_err(|e| DownloadError::persistence(&staging, e))?;
    file.sync_all()
        .await
        .map_err(|e| DownloadError::persistence(&staging, e))?;
    publish(&staging, destination).await
}

async fn assemble(plan: &PartitionPlan, results: &[FetchResult], staging: &Path) -> Result<u64> {
    let file = File::create(staging)
        .await
        .map_err(|e| DownloadError::persistence(staging, e))?;
    let mut writer = BufWriter::new(file);
    let mut total = 0u64;

    for range in plan {
        let result = results
            .iter()
            .find(|r| r.index == range.index)
            .ok_or_else(|| {
                DownloadError::persistence(
                    staging,
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no artifact for section {}", range.index),
                    ),
                )
            })?;

        let mut section = File::open(&result.path)
            .await
            .map_err(|e| DownloadError::persistence(&result.path, e))?;
        let copied = tokio::io::copy(&mut section, &mut writer)
            .await
            .map_err(|e| DownloadError::persistence(&result.path, e))?;

        if copied != range.len() {
            return Err(DownloadError::LengthMismatch {
                index: range.index,
                expected: range.len(),
                actual: copied,
            });
        }
        debug!(index = range.index, bytes = copied, "Section merged");
        total += copied;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::persistence(staging, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| DownloadError::persistence(staging, e))?;
    Ok(total)
}

async fn publish(staging: &Path, destination: &Path) -> Result<()> {
    fs::rename(staging, destination)
        .await
        .map_err(|e| DownloadError::persistence(destination, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::partition;
    use crate::utils::section_path;
    use tempfile::tempdir;

    async fn write_sections(dir: &Path, payloads: &[&[u8]]) -> Vec<FetchResult> {
        let mut results = Vec::new();
        for (index, payload) in payloads.iter().enumerate() {
            let path = section_path(dir, index);
            fs::write(&path, payload).await.unwrap();
            results.push(FetchResult {
                index,
                path,
                bytes_written: payload.len() as u64,
                filename_hint: None,
            });
        }
        results
    }

    #[tokio::test]
    async fn test_merge_follows_plan_order() -> Result<()> {
        let dir = tempdir().unwrap();
        let plan = partition(20, 4)?;
        let mut results =
            write_sections(dir.path(), &[b"abcdef", b"ghijkl", b"mnopqr", b"st"]).await;
        // Completion order must not matter.
        results.reverse();

        let destination = dir.path().join("out.bin");
        let total = merge_sections(&plan, &results, &destination).await?;

        assert_eq!(total, 20);
        assert_eq!(
            fs::read(&destination).await.unwrap(),
            b"abcdefghijklmnopqrst"
        );
        assert!(!staging_path(&destination).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_artifact_leaves_nothing_published() -> Result<()> {
        let dir = tempdir().unwrap();
        let plan = partition(20, 4)?;
        let results =
            write_sections(dir.path(), &[b"abcdef", b"ghijkl", b"mnopqr", b"st"]).await;
        fs::remove_file(&results[2].path).await.unwrap();

        let destination = dir.path().join("out.bin");
        let err = merge_sections(&plan, &results, &destination)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Persistence { .. }));
        assert!(!destination.exists());
        assert!(!staging_path(&destination).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_short_artifact_is_rejected() -> Result<()> {
        let dir = tempdir().unwrap();
        let plan = partition(20, 4)?;
        let results = write_sections(dir.path(), &[b"abcdef", b"ghi", b"mnopqr", b"st"]).await;

        let destination = dir.path().join("out.bin");
        let err = merge_sections(&plan, &results, &destination)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::LengthMismatch {
                index: 1,
                expected: 6,
                actual: 3
            }
        ));
        assert!(!destination.exists());
        Ok(())
    }

    #[test]
    fn test_staging_name_fits_length_limit() {
        let short = staging_path(Path::new("exports/photo.jpg"));
        assert_eq!(short, Path::new("exports/.photo.jpg.part"));

        let long = format!("{}.jpg", "\u{00e9}".repeat(125));
        let staging = staging_path(&Path::new("exports").join(&long));
        let name = staging.file_name().unwrap().to_str().unwrap();
        assert!(name.len() <= MAX_NAME_LEN);
        assert!(name.starts_with('.') && name.ends_with(".part"));
    }

    #[tokio::test]
    async fn test_merge_to_longest_valid_name() -> Result<()> {
        let dir = tempdir().unwrap();
        let plan = partition(8, 2)?;
        let results = write_sections(dir.path(), &[b"abcd", b"efgh"]).await;
        let name = format!("{}.bin", "a".repeat(MAX_NAME_LEN - 4));
        assert_eq!(name.len(), MAX_NAME_LEN);

        let destination = dir.path().join(&name);
        let total = merge_sections(&plan, &results, &destination).await?;

        assert_eq!(total, 8);
        assert_eq!(fs::read(&destination).await.unwrap(), b"abcdefgh");
        assert!(!staging_path(&destination).exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_existing_output_is_replaced() -> Result<()> {
        let dir = tempdir().unwrap();
        let plan = partition(3, 1)?;
        let results = write_sections(dir.path(), &[b"new"]).await;
        let destination = dir.path().join("out.bin");
        fs::write(&destination, b"old contents").await.unwrap();

        merge_sections(&plan, &results, &destination).await?;
        assert_eq!(fs::read(&destination).await.unwrap(), b"new");
        Ok(())
    }

    #[tokio::test]
    async fn test_publish_empty() -> Result<()> {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("empty.bin");
        publish_empty(&destination).await?;
        assert_eq!(fs::metadata(&destination).await.unwrap().len(), 0);
        Ok(())
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("exports/photo.jpg")),
            PathBuf::from("exports/.photo.jpg.part")
        );
    }
}
