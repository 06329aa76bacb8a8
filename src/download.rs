//! Resumable, hash-gated downloads
//!
//! A fetch walks a fixed sequence of stages:
//!
//! ```text
//! CheckLocal ─┬─> Done (digest already matches, no network traffic)
//!             └─> [ ProbeSize -> Transfer -> VerifySize ]  (retried as a unit)
//!                   └─> VerifyHash ─┬─> Done
//!                                   └─> Validation error (never retried)
//! ```
//!
//! Partial bytes survive a failed attempt so the next one can resume with a
//! `Range` request. They are only appended to when the server answers `206`;
//! any other answer truncates the file and the transfer starts over from 0.
//!
//! ## Example
//!
//! ```no_run
//! use asset_deploy::download::{DownloadTask, ResumableDownloader};
//!
//! let task = DownloadTask::new(
//!     "https://example.com/libraries.7z",
//!     "third_party/libraries.7z",
//!     "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08",
//! );
//! ResumableDownloader::new().fetch(&task)?;
//! # Ok::<(), asset_deploy::FetchError>(())
//! ```

use crate::config::{self, MismatchPolicy};
use crate::error::{FetchError, Result};
use crate::hash;
use crate::output;
use crate::progress::Progress;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::transport::{
    self, PARTIAL_CONTENT, RANGE_NOT_SATISFIABLE, Response, Transport, UreqTransport,
};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// One asset to fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    url: String,
    destination: PathBuf,
    sha256: String,
    chunk_size: usize,
    max_attempts: u32,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, sha256: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            sha256: sha256.into().trim().to_ascii_lowercase(),
            chunk_size: config::DEFAULT_CHUNK_SIZE,
            max_attempts: config::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Bytes read per write; at least 1.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Network attempts including the first; at least 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Expected digest, lowercase hex.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn display_name(&self) -> String {
        self.destination
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string())
    }
}

/// Resume bookkeeping for one attempt. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadState {
    /// Bytes already in the destination file.
    pub on_disk: u64,
    /// Server-reported size, when known.
    pub total: Option<u64>,
    /// Whether `on_disk` bytes should be kept and a range requested.
    pub resumable: bool,
}

impl DownloadState {
    fn new(on_disk: u64, total: Option<u64>) -> Self {
        Self {
            on_disk,
            total,
            resumable: on_disk > 0,
        }
    }

    /// Forget the partial bytes; the next write truncates.
    fn restart(&mut self) {
        self.on_disk = 0;
        self.resumable = false;
    }
}

/// How a successful fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination already held the expected content.
    AlreadyPresent,
    /// The file was transferred and verified.
    Downloaded { bytes: u64, attempts: u32 },
}

/// Top-level stages of a fetch.
enum Stage {
    CheckLocal,
    Fetch,
    VerifyHash { bytes: u64, attempts: u32 },
    Done(FetchOutcome),
}

/// Stages inside one retried attempt.
enum AttemptStage {
    ProbeSize,
    Transfer(DownloadState),
    VerifySize { state: DownloadState, written: u64 },
}

/// Lazy sequence of cumulative byte counts for one transfer.
///
/// Each `next()` moves at most one chunk from the response body into the
/// destination file. The count starts at the resume offset, so a new attempt
/// gets a new sequence that restarts from whatever is on disk. The sequence
/// ends after the body is exhausted or after the first error.
pub struct TransferProgress<'a, R, W> {
    reader: R,
    writer: W,
    buffer: Vec<u8>,
    position: u64,
    url: &'a str,
    path: &'a Path,
    finished: bool,
}

impl<'a, R: Read, W: Write> TransferProgress<'a, R, W> {
    pub fn new(reader: R, writer: W, chunk_size: usize, start: u64, url: &'a str, path: &'a Path) -> Self {
        Self {
            reader,
            writer,
            buffer: vec![0u8; chunk_size.max(1)],
            position: start,
            url,
            path,
            finished: false,
        }
    }

    /// Bytes accounted for so far, including the resume offset.
    pub fn position(&self) -> u64 {
        self.position
    }
}

impl<R: Read, W: Write> Iterator for TransferProgress<'_, R, W> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let n = loop {
            match self.reader.read(&mut self.buffer) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(FetchError::transient(
                        self.url,
                        format!("read error: {}", e),
                    )));
                }
            }
        };

        if n == 0 {
            self.finished = true;
            return None;
        }

        if let Err(e) = self.writer.write_all(&self.buffer[..n]) {
            self.finished = true;
            return Some(Err(FetchError::io("write", self.path, e)));
        }

        self.position += n as u64;
        Some(Ok(self.position))
    }
}

/// Fetches [`DownloadTask`]s over a [`Transport`].
pub struct ResumableDownloader<T = UreqTransport> {
    transport: T,
    sleeper: Box<dyn Sleeper + Send + Sync>,
    backoff: RetryPolicy,
    on_mismatch: MismatchPolicy,
    show_progress: bool,
}

impl ResumableDownloader<UreqTransport> {
    /// Downloader over `ureq` with default backoff and the env mismatch policy.
    pub fn new() -> Self {
        Self::with_transport(UreqTransport::new())
    }
}

impl Default for ResumableDownloader<UreqTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> ResumableDownloader<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            sleeper: Box::new(ThreadSleeper),
            backoff: RetryPolicy::default(),
            on_mismatch: MismatchPolicy::from_env(),
            show_progress: true,
        }
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + Send + Sync + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Wait schedule between attempts. The attempt limit comes from each task.
    pub fn with_backoff(mut self, backoff: RetryPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn on_mismatch(mut self, policy: MismatchPolicy) -> Self {
        self.on_mismatch = policy;
        self
    }

    /// Disable progress bars.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Make `task.destination()` hold content matching `task.sha256()`.
    pub fn fetch(&self, task: &DownloadTask) -> Result<FetchOutcome> {
        transport::validate_url(task.url())?;
        ensure_parent_dir(task.destination())?;

        let mut stage = Stage::CheckLocal;
        loop {
            stage = match stage {
                Stage::CheckLocal => self.check_local(task)?,
                Stage::Fetch => {
                    let policy = self.backoff.with_max_attempts(task.max_attempts());
                    let (bytes, attempts) = policy.run(&*self.sleeper, |attempt| {
                        self.attempt(task).map(|bytes| (bytes, attempt))
                    })?;
                    Stage::VerifyHash { bytes, attempts }
                }
                Stage::VerifyHash { bytes, attempts } => self.verify_hash(task, bytes, attempts)?,
                Stage::Done(outcome) => return Ok(outcome),
            };
        }
    }

    fn check_local(&self, task: &DownloadTask) -> Result<Stage> {
        if hash::matches(task.destination(), task.sha256())? {
            output::skip(&format!(
                "{} already present with the expected hash, skipping",
                task.destination().display()
            ));
            return Ok(Stage::Done(FetchOutcome::AlreadyPresent));
        }
        Ok(Stage::Fetch)
    }

    /// One probe-transfer-size-check pass. Returns the bytes on disk.
    fn attempt(&self, task: &DownloadTask) -> Result<u64> {
        let mut stage = AttemptStage::ProbeSize;
        loop {
            stage = match stage {
                AttemptStage::ProbeSize => AttemptStage::Transfer(self.probe_size(task)?),
                AttemptStage::Transfer(state) => {
                    let (state, written) = self.transfer(task, state)?;
                    AttemptStage::VerifySize { state, written }
                }
                AttemptStage::VerifySize { state, written } => {
                    return verify_size(task, state, written);
                }
            };
        }
    }

    fn probe_size(&self, task: &DownloadTask) -> Result<DownloadState> {
        let path = task.destination();
        let on_disk = local_len(path)?;
        // Only a transient probe failure costs an attempt. A status the
        // server will repeat just leaves the size unknown; the GET decides.
        let total = match self.transport.probe(task.url()) {
            Ok(probe) => probe.content_length,
            Err(FetchError::Rejected { status, .. }) => {
                output::detail(&format!(
                    "size probe for {} answered HTTP {}, continuing with unknown size",
                    task.display_name(),
                    status
                ));
                None
            }
            Err(e) => return Err(e.at_offset(on_disk, None)),
        };

        let mut state = DownloadState::new(on_disk, total);
        if let Some(total) = state.total
            && state.on_disk >= total
        {
            // A prefix of the remote file is always shorter than it; this
            // content already failed the pre-flight hash check.
            output::detail(&format!(
                "discarding {} ({} bytes on disk, server reports {})",
                path.display(),
                state.on_disk,
                total
            ));
            remove_if_exists(path)?;
            state.restart();
        }
        Ok(state)
    }

    fn transfer(&self, task: &DownloadTask, mut state: DownloadState) -> Result<(DownloadState, u64)> {
        let url = task.url();
        let path = task.destination();
        let name = task.display_name();

        let range = state.resumable.then_some(state.on_disk);
        let mut response = match self.transport.get(url, range) {
            Ok(response) => response,
            Err(FetchError::Rejected { status, .. })
                if range.is_some() && status == RANGE_NOT_SATISFIABLE =>
            {
                output::detail(&format!(
                    "server rejected range for {} (HTTP {}), restarting from 0",
                    name, status
                ));
                state.restart();
                self.transport
                    .get(url, None)
                    .map_err(|e| e.at_offset(0, state.total))?
            }
            Err(e) => return Err(e.at_offset(state.on_disk, state.total)),
        };

        if state.resumable
            && response.status == PARTIAL_CONTENT
            && let Some(start) = response.content_range_start
            && start != state.on_disk
        {
            output::detail(&format!(
                "server sent {} from byte {} instead of {}, restarting from 0",
                name, start, state.on_disk
            ));
            state.restart();
            response = self
                .transport
                .get(url, None)
                .map_err(|e| e.at_offset(0, state.total))?;
        }

        let append = state.resumable && response.status == PARTIAL_CONTENT;
        if state.resumable && !append {
            output::detail(&format!(
                "server ignored range for {} (HTTP {}), restarting from 0",
                name, response.status
            ));
            state.restart();
        } else if append {
            output::detail(&format!("resuming {} from {} bytes", name, state.on_disk));
        }

        let file = open_destination(path, append)?;
        let written = self.stream(task, &state, response, file)?;
        Ok((state, written))
    }

    fn stream(&self, task: &DownloadTask, state: &DownloadState, response: Response, mut file: File) -> Result<u64> {
        let path = task.destination();
        let progress = Progress::transfer(
            self.show_progress,
            &task.display_name(),
            state.total,
            state.on_disk,
        );

        let chunks = TransferProgress::new(
            response.body,
            &mut file,
            task.chunk_size(),
            state.on_disk,
            task.url(),
            path,
        );
        for position in chunks {
            match position {
                Ok(position) => progress.set_position(position),
                Err(e) => return Err(e.at_offset(progress.position(), state.total)),
            }
        }

        file.flush().map_err(|e| FetchError::io("write", path, e))?;
        let written = file
            .metadata()
            .map_err(|e| FetchError::io("stat", path, e))?
            .len();
        Ok(written)
    }

    fn verify_hash(&self, task: &DownloadTask, bytes: u64, attempts: u32) -> Result<Stage> {
        let path = task.destination();
        match hash::verify(path, task.sha256()) {
            Ok(()) => {
                output::detail(&format!("downloaded {} ({} bytes)", task.display_name(), bytes));
                Ok(Stage::Done(FetchOutcome::Downloaded { bytes, attempts }))
            }
            Err(err @ FetchError::Validation { .. }) => {
                match self.on_mismatch {
                    MismatchPolicy::Delete => {
                        remove_if_exists(path)?;
                        output::detail(&format!("removed corrupt download {}", path.display()));
                    }
                    MismatchPolicy::Keep => {
                        output::warning(&format!("kept corrupt download {} for inspection", path.display()));
                    }
                }
                Err(err)
            }
            Err(other) => Err(other),
        }
    }
}

/// Size gate: retryable when short, and an overshoot also drops the file.
fn verify_size(task: &DownloadTask, state: DownloadState, written: u64) -> Result<u64> {
    let Some(total) = state.total else {
        return Ok(written);
    };
    if written == total {
        return Ok(written);
    }
    if written > total {
        remove_if_exists(task.destination())?;
    }
    Err(FetchError::transient(
        task.url(),
        format!("incomplete transfer: {} of {} bytes on disk", written, total),
    )
    .at_offset(written, Some(total)))
}

/// Ensure a file's parent directory exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| FetchError::io("create directory", parent, e))?;
    }
    Ok(())
}

fn local_len(path: &Path) -> Result<u64> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Ok(0),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
        Err(e) => Err(FetchError::io("stat", path, e)),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FetchError::io("remove", path, e)),
    }
}

fn open_destination(path: &Path, append: bool) -> Result<File> {
    if append {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| FetchError::io("open for append", path, e))
    } else {
        File::create(path).map_err(|e| FetchError::io("create", path, e))
    }
}
