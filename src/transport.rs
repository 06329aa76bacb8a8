//! HTTP transport used by the downloader
//!
//! The [`Transport`] trait is the seam between the resume logic and the
//! network; [`UreqTransport`] is the blocking production implementation.
//! Status codes are classified here so the downloader only sees
//! [`FetchError`] kinds:
//!
//! - connection failures, timeouts, 5xx, 408 and 429 are transient
//! - every other error status is a rejection and is not retried

use crate::config;
use crate::error::{FetchError, Result};
use std::io::Read;
use std::time::Duration;

/// HTTP status the server sends when it honored a `Range` request.
pub const PARTIAL_CONTENT: u16 = 206;

/// HTTP status for a range that cannot be satisfied.
pub const RANGE_NOT_SATISFIABLE: u16 = 416;

/// Result of a size-probing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// Server-reported size. `None` when absent, unparsable or zero.
    pub content_length: Option<u64>,
}

/// A successful GET whose body has not been read yet.
pub struct Response {
    pub status: u16,
    /// First byte position from `Content-Range`, when the server sent one.
    pub content_range_start: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("content_range_start", &self.content_range_start)
            .finish_non_exhaustive()
    }
}

/// Network operations the downloader needs.
pub trait Transport {
    /// Metadata request (HEAD) used to learn the total size.
    fn probe(&self, url: &str) -> Result<Probe>;

    /// GET, with `Range: bytes=<start>-` when `range_start` is set.
    fn get(&self, url: &str, range_start: Option<u64>) -> Result<Response>;
}

/// Blocking transport backed by a `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::with_timeout(config::http_timeout())
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that gives up when connecting, or any single read, takes
    /// longer than `timeout`. A whole transfer has no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .user_agent(concat!("asset-deploy/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn probe(&self, url: &str) -> Result<Probe> {
        let response = self
            .agent
            .head(url)
            .call()
            .map_err(|e| classify(url, e))?;

        Ok(Probe {
            content_length: parse_content_length(response.header("content-length")),
        })
    }

    fn get(&self, url: &str, range_start: Option<u64>) -> Result<Response> {
        let mut request = self.agent.get(url);
        if let Some(start) = range_start {
            request = request.set("Range", &format!("bytes={}-", start));
        }

        let response = request.call().map_err(|e| classify(url, e))?;
        Ok(Response {
            status: response.status(),
            content_range_start: parse_content_range_start(response.header("content-range")),
            body: Box::new(response.into_reader()),
        })
    }
}

/// Reject anything that is not plain HTTP(S) before touching the network.
pub fn validate_url(url: &str) -> Result<()> {
    let lower = url.trim().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(FetchError::UnsupportedUrl(url.to_string()))
    }
}

/// Last path segment of a URL, without query string or fragment.
///
/// Falls back to `"download"` when the URL has no usable segment.
///
/// # Example
/// ```
/// use asset_deploy::transport::file_name_from_url;
/// assert_eq!(file_name_from_url("https://example.com/libs/lib-1.0.7z?x=1"), "lib-1.0.7z");
/// ```
pub fn file_name_from_url(url: &str) -> String {
    let clean = url.split(['?', '#']).next().unwrap_or(url);
    let path = clean.split_once("://").map_or(clean, |(_, rest)| rest);

    match path.split_once('/') {
        Some((_host, rest)) => rest
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty() && *s != "." && *s != "..")
            .map(str::to_string)
            .unwrap_or_else(|| "download".to_string()),
        None => "download".to_string(),
    }
}

/// Map an error status to its [`FetchError`] kind.
pub fn status_error(url: &str, status: u16) -> FetchError {
    match status {
        408 | 429 | 500..=599 => FetchError::transient(url, format!("HTTP {}", status)),
        _ => FetchError::Rejected {
            url: url.to_string(),
            status,
        },
    }
}

fn classify(url: &str, err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Status(status, _) => status_error(url, status),
        ureq::Error::Transport(transport) => match transport.kind() {
            ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                FetchError::UnsupportedUrl(url.to_string())
            }
            _ => FetchError::transient(url, transport.to_string()),
        },
    }
}

/// A zero length is treated as unknown, like a missing header.
fn parse_content_length(header: Option<&str>) -> Option<u64> {
    header
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|&len| len > 0)
}

/// Start offset of `Content-Range: bytes <start>-<end>/<total>`.
fn parse_content_range_start(header: Option<&str>) -> Option<u64> {
    let spec = header?.trim().strip_prefix("bytes")?.trim_start();
    let (start, _) = spec.split_once('-')?;
    start.trim().parse().ok()
}
