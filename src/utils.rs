//! Utility helpers used across the crate.
//!
//! Filename extraction from URLs and `Content-Disposition` headers, and the
//! naming and purging of per-section artifacts.
use crate::error::{DownloadError, Result};
use crate::plan::PartitionPlan;
use percent_encoding::percent_decode_str;
use sanitize_filename::sanitize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use url::Url;

/// Fallback used when neither the URL nor the caller yields a filename.
pub const DEFAULT_FILENAME: &str = "output.bin";

/// Extracts a clean filename from a URL.
///
/// 1. Parses the URL.
/// 2. Extracts the last segment of the path.
/// 3. URL-decodes it (converts %20 to space, etc.).
/// 4. Sanitizes it to remove characters invalid for the OS.
/// 5. Falls back to [`DEFAULT_FILENAME`] if no valid filename is found.
pub fn get_filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .map(|mut s| s.next_back().unwrap_or("").to_string())
        })
        .map(|s| percent_decode_str(&s).decode_utf8_lossy().to_string())
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

/// Path of the artifact holding section `index` inside `tmp_dir`.
pub fn section_path(tmp_dir: &Path, index: usize) -> PathBuf {
    tmp_dir.join(format!("section-{index}.tmp"))
}

/// Removes every section artifact of `plan` from `tmp_dir`.
///
/// Artifacts that are already gone are skipped. A failure does not stop the
/// remaining removals; the first one is returned.
pub async fn purge_sections(plan: &PartitionPlan, tmp_dir: &Path) -> Result<()> {
    let mut first_error = None;
    for range in plan {
        let path = section_path(tmp_dir, range.index);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                first_error.get_or_insert(DownloadError::persistence(path, e));
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Extracts the filename hint from a `Content-Disposition` header value.
///
/// `filename*` (RFC 5987) wins over plain `filename`. The result is reduced
/// to its final path component and sanitized.
///
/// Returns `Ok(None)` when the header carries no filename parameter.
///
/// # Errors
///
/// Returns [`DownloadError::FilenameResolution`] if the header is malformed.
pub fn filename_from_disposition(value: &str) -> Result<Option<String>> {
    let malformed = || DownloadError::FilenameResolution(value.to_string());
    let params = parse_disposition(value).ok_or_else(malformed)?;

    let mut plain = None;
    let mut extended = None;
    for (name, val) in params {
        match name.as_str() {
            "filename" if plain.is_none() => plain = Some(val),
            "filename*" if extended.is_none() => {
                extended = Some(decode_ext_value(&val).ok_or_else(malformed)?)
            }
            _ => {}
        }
    }

    Ok(extended
        .or(plain)
        .map(|name| {
            let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
            sanitize(base)
        })
        .filter(|name| !name.is_empty()))
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

/// Splits a disposition header into lowercased parameter names and values.
/// `None` means the header does not follow `type *( ";" name "=" value )`.
fn parse_disposition(value: &str) -> Option<Vec<(String, String)>> {
    let (kind, mut rest) = match value.find(';') {
        Some(pos) => (&value[..pos], &value[pos..]),
        None => (value, ""),
    };
    let kind = kind.trim();
    if kind.is_empty() || !kind.chars().all(is_token_char) {
        return None;
    }

    let mut params = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Some(params);
        }
        rest = rest.strip_prefix(';')?.trim_start();
        if rest.is_empty() {
            // tolerate a trailing separator
            return Some(params);
        }

        let eq = rest.find('=')?;
        let name = rest[..eq].trim();
        if name.is_empty() || !name.chars().all(is_token_char) {
            return None;
        }
        rest = rest[eq + 1..].trim_start();

        let val = if let Some(quoted) = rest.strip_prefix('"') {
            let mut out = String::new();
            let mut chars = quoted.char_indices();
            let mut closed = None;
            while let Some((i, c)) = chars.next() {
                match c {
                    '\\' => out.push(chars.next()?.1),
                    '"' => {
                        closed = Some(i);
                        break;
                    }
                    _ => out.push(c),
                }
            }
            rest = &quoted[closed? + 1..];
            out
        } else {
            let end = rest.find(';').unwrap_or(rest.len());
            let token = rest[..end].trim();
            if token.is_empty() || token.contains(char::is_whitespace) {
                return None;
            }
            rest = &rest[end..];
            token.to_string()
        };

        params.push((name.to_ascii_lowercase(), val));
    }
}

/// Decodes an RFC 5987 `charset'language'value` parameter.
fn decode_ext_value(raw: &str) -> Option<String> {
    let mut parts = raw.splitn(3, '\'');
    let charset = parts.next()?;
    let _language = parts.next()?;
    let encoded = parts.next()?;
    let bytes = percent_decode_str(encoded);

    if charset.eq_ignore_ascii_case("utf-8") {
        bytes.decode_utf8().ok().map(|s| s.into_owned())
    } else if charset.eq_ignore_ascii_case("iso-8859-1") {
        Some(bytes.map(char::from).collect())
    } else {
        None
    }
}
