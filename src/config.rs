//! Environment-driven defaults for the pipeline.
//!
//! | Variable              | Effect                                          |
//! |-----------------------|-------------------------------------------------|
//! | `ASSET_HTTP_TIMEOUT`  | per-request timeout in seconds (5..=300)        |
//! | `ASSET_KEEP_CORRUPT`  | `1`/`true` keeps files that fail the hash check |
//! | `ASSET_TOOL`          | explicit archive tool path, skips the search    |

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Default HTTP timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Bytes read from the response per write.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Attempts per download, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Get HTTP timeout from environment variable or use default.
/// Cached for the life of the process.
pub fn http_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let secs = std::env::var("ASSET_HTTP_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        Duration::from_secs(secs.clamp(5, 300))
    })
}

/// What to do with a downloaded file whose digest does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Remove it so the next run starts clean.
    #[default]
    Delete,
    /// Leave it in place for inspection.
    Keep,
}

impl MismatchPolicy {
    /// Policy from `ASSET_KEEP_CORRUPT`, falling back to [`MismatchPolicy::Delete`].
    pub fn from_env() -> Self {
        match std::env::var("ASSET_KEEP_CORRUPT") {
            Ok(v) if parse_flag(&v) => Self::Keep,
            _ => Self::Delete,
        }
    }
}

/// Explicit archive tool from `ASSET_TOOL`, if set and non-empty.
pub fn tool_override() -> Option<PathBuf> {
    std::env::var_os("ASSET_TOOL")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_reasonable() {
        assert!(DEFAULT_HTTP_TIMEOUT_SECS >= 5);
        assert!(DEFAULT_HTTP_TIMEOUT_SECS <= 120);
        let timeout = http_timeout();
        assert!(timeout.as_secs() >= 5);
        assert!(timeout.as_secs() <= 300);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
        assert!(!parse_flag("nope"));
    }

    #[test]
    fn test_default_policy_deletes() {
        assert_eq!(MismatchPolicy::default(), MismatchPolicy::Delete);
    }
}
