//! Metadata probe issued before any section is fetched.
use crate::error::{DownloadError, Result};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap};
use tracing::{debug, info};

/// What the server told us about the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Total length of the resource in bytes.
    pub total_size: u64,
    /// Whether the server advertised `Accept-Ranges: bytes`.
    pub supports_range: bool,
}

/// Fetches the length of a resource and its range support with a HEAD request.
///
/// No body is transferred and nothing is written locally.
///
/// # Errors
///
/// Returns an error if:
/// * The network request fails ([`DownloadError::Transport`]).
/// * The server returns a status of 300 or above ([`DownloadError::HttpStatus`]).
/// * The server does not provide a usable `Content-Length` header
///   ([`DownloadError::SizeUnknown`]).
pub async fn probe(url: &str, client: &reqwest::Client) -> Result<ProbeResult> {
    info!(%url, "Making a connection...");
    let response = client.head(url).send().await?;

    let status = response.status();
    info!(status = status.as_u16(), "Probe answered");
    if !status.is_success() {
        return Err(DownloadError::HttpStatus {
            code: status.as_u16(),
        });
    }

    let headers = response.headers();
    let total_size = content_length(headers)?;
    let supports_range = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| {
            v.split(',')
                .any(|unit| unit.trim().eq_ignore_ascii_case("bytes"))
        });

    debug!(total_size, supports_range, "Probe complete");
    Ok(ProbeResult {
        total_size,
        supports_range,
    })
}

/// Reads the declared resource length.
///
/// `Response::content_length` reports the (empty) body for HEAD, so the header
/// is parsed directly.
fn content_length(headers: &HeaderMap) -> Result<u64> {
    headers
        .get(CONTENT_LENGTH)
        .ok_or_else(|| DownloadError::SizeUnknown("Content-Length header missing".into()))?
        .to_str()
        .map_err(|e| DownloadError::SizeUnknown(e.to_string()))?
        .trim()
        .parse::<u64>()
        .map_err(|e| DownloadError::SizeUnknown(format!("invalid Content-Length: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_probe_reads_size_and_range_support() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/file.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 20])
                    .insert_header("Accept-Ranges", "bytes"),
            )
            .mount(&server)
            .await;

        let result = probe(&format!("{}/file.bin", server.uri()), &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!(
            result,
            ProbeResult {
                total_size: 20,
                supports_range: true
            }
        );
    }

    #[tokio::test]
    async fn test_probe_without_accept_ranges() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 7]))
            .mount(&server)
            .await;

        let result = probe(&server.uri(), &reqwest::Client::new()).await.unwrap();
        assert_eq!(result.total_size, 7);
        assert!(!result.supports_range);
    }

    #[tokio::test]
    async fn test_probe_rejects_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = probe(&server.uri(), &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { code: 404 }));
    }

    #[tokio::test]
    async fn test_probe_unreachable_host_is_transport_error() {
        // Port 9 (discard) on localhost is almost never listening.
        let err = probe("http://127.0.0.1:9/file", &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Transport(_)));
    }

    fn headers_with_length(value: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(CONTENT_LENGTH, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn test_content_length_parsing() {
        assert_eq!(content_length(&headers_with_length(Some("20"))).unwrap(), 20);
        assert_eq!(content_length(&headers_with_length(Some("0"))).unwrap(), 0);
        assert!(matches!(
            content_length(&headers_with_length(None)),
            Err(DownloadError::SizeUnknown(_))
        ));
        assert!(matches!(
            content_length(&headers_with_length(Some("twenty"))),
            Err(DownloadError::SizeUnknown(_))
        ));
        assert!(matches!(
            content_length(&headers_with_length(Some("-1"))),
            Err(DownloadError::SizeUnknown(_))
        ));
    }
}
