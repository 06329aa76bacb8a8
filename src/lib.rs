//! Resumable, integrity-verified asset deployment
//!
//! Fetches large binary archives over HTTP, verifies them against a SHA-256
//! digest, and unpacks them into a build tree with the external 7-Zip tool.
//!
//! # Pipeline
//!
//! 1. [`ResumableDownloader::fetch`] skips the network entirely when the
//!    destination already hashes to the expected digest. Otherwise it probes
//!    the size, transfers (resuming partial files with `Range` requests), and
//!    checks the size, retrying that unit on transient network faults.
//! 2. The finished file must match the digest. A mismatch is never retried.
//! 3. [`ArchiveExtractor::extract`] resolves the tool for the current
//!    [`Platform`] and runs `7z x <archive> -o<dest> -aoa`.
//!
//! # Example
//!
//! ```no_run
//! use asset_deploy::{ArchiveExtractor, DownloadTask, ResumableDownloader};
//! use std::path::Path;
//!
//! let task = DownloadTask::new(
//!     "https://example.com/libraries.7z",
//!     "third_party/libraries.7z",
//!     "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
//! );
//! ResumableDownloader::new().fetch(&task)?;
//! ArchiveExtractor::new().extract(task.destination(), Path::new("third_party/libraries"))?;
//! # Ok::<(), asset_deploy::FetchError>(())
//! ```
//!
//! # Environment
//!
//! - `ASSET_HTTP_TIMEOUT` - per-request timeout in seconds
//! - `ASSET_KEEP_CORRUPT` - keep downloads that fail the hash check
//! - `ASSET_TOOL` - explicit path to the archive tool

pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod hash;
pub mod manifest;
pub mod output;
pub mod progress;
pub mod retry;
pub mod tool;
pub mod transport;

pub use config::MismatchPolicy;
pub use download::{DownloadState, DownloadTask, FetchOutcome, ResumableDownloader, TransferProgress};
pub use error::{ErrorKind, FetchError};
pub use extract::{ArchiveExtractor, ArchiveJob, ProcessOutput, ProcessRunner, SystemRunner};
pub use manifest::{AssetSpec, Deployer, Manifest};
pub use retry::{RetryPolicy, RetryState, Sleeper, ThreadSleeper};
pub use tool::{Platform, ToolResolver};
pub use transport::{Probe, Response, Transport, UreqTransport};
