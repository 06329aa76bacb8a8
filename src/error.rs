//! Fetch and extraction error types.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`FetchError`].
///
/// Callers use this to decide whether to abort the whole deployment or skip
/// a single asset, without matching on variant payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network-level fault that may succeed on retry.
    TransientNetwork,
    /// The server answered, but with a status that will not change on retry.
    Rejected,
    /// Downloaded content failed the integrity gate.
    Validation,
    /// No archive tool exists on any search path.
    ToolNotFound,
    /// The archive tool ran and exited unsuccessfully.
    ExtractionProcess,
    /// Local filesystem failure.
    Io,
}

/// Errors raised by the fetch-verify-extract pipeline.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transient network error for {url}: {detail}{}", offsets_suffix(.offset, .total))]
    Transient {
        url: String,
        detail: String,
        /// Bytes on disk when the fault happened, if known.
        offset: Option<u64>,
        /// Server-reported size, if known.
        total: Option<u64>,
    },

    #[error("request for {url} rejected with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("unsupported URL (expected http:// or https://): {0}")]
    UnsupportedUrl(String),

    #[error(
        "sha256 integrity check failed for '{}'\n  expected: {expected}\n  got:      {actual}",
        .path.display()
    )]
    Validation {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("archive tool not found; searched: {}", format_searched(.searched))]
    ToolNotFound { searched: Vec<PathBuf> },

    #[error("extraction of '{}' failed (exit code: {code:?})\nstderr: {stderr}", .archive.display())]
    ExtractionProcess {
        archive: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    #[error("cannot {action} '{}': {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::TransientNetwork,
            Self::Rejected { .. } | Self::UnsupportedUrl(_) => ErrorKind::Rejected,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::ToolNotFound { .. } => ErrorKind::ToolNotFound,
            Self::ExtractionProcess { .. } => ErrorKind::ExtractionProcess,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    /// Whether [`RetryPolicy`](crate::retry::RetryPolicy) may try again.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientNetwork
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transient(url: &str, detail: impl Into<String>) -> Self {
        Self::Transient {
            url: url.to_string(),
            detail: detail.into(),
            offset: None,
            total: None,
        }
    }

    /// Attach byte offsets to a transient error; other variants pass through.
    pub(crate) fn at_offset(self, on_disk: u64, expected_total: Option<u64>) -> Self {
        match self {
            Self::Transient { url, detail, .. } => Self::Transient {
                url,
                detail,
                offset: Some(on_disk),
                total: expected_total,
            },
            other => other,
        }
    }
}

fn offsets_suffix(offset: &Option<u64>, total: &Option<u64>) -> String {
    match (offset, total) {
        (Some(offset), Some(total)) => format!(" (at {} of {} bytes)", offset, total),
        (Some(offset), None) => format!(" (at {} bytes)", offset),
        _ => String::new(),
    }
}

fn format_searched(searched: &[PathBuf]) -> String {
    if searched.is_empty() {
        return "(no candidates)".to_string();
    }
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T, E = FetchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(FetchError::transient("http://x", "timed out").is_transient());
        assert!(
            !FetchError::Rejected {
                url: "http://x".into(),
                status: 404
            }
            .is_transient()
        );
        let validation = FetchError::Validation {
            path: "a".into(),
            expected: "00".into(),
            actual: "11".into(),
        };
        assert_eq!(validation.kind(), ErrorKind::Validation);
        assert!(!validation.is_transient());
    }

    #[test]
    fn test_transient_message_carries_offsets() {
        let err = FetchError::transient("http://host/a.7z", "incomplete transfer").at_offset(10, Some(40));
        let msg = err.to_string();
        assert!(msg.contains("incomplete transfer"));
        assert!(msg.contains("at 10 of 40 bytes"));
    }

    #[test]
    fn test_at_offset_leaves_other_kinds_alone() {
        let err = FetchError::Rejected {
            url: "http://x".into(),
            status: 403,
        }
        .at_offset(5, None);
        assert_eq!(err.kind(), ErrorKind::Rejected);
    }

    #[test]
    fn test_tool_not_found_lists_candidates() {
        let err = FetchError::ToolNotFound {
            searched: vec!["7z".into(), "/usr/bin/7z".into()],
        };
        assert!(err.to_string().contains("/usr/bin/7z"));
    }
}
