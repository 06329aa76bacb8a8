//! Archive extraction through the external 7-Zip tool
//!
//! The tool is resolved before anything else happens; without it no process
//! is started. The tool runs as
//!
//! ```text
//! 7z x <archive> -o<destination> -aoa
//! ```
//!
//! where `-aoa` overwrites existing files so redeploying is idempotent. A
//! non-zero exit is fatal and carries the tool's stderr. Extraction is not
//! retried: a corrupt archive or broken tool will fail the same way again.

use crate::error::{FetchError, Result};
use crate::output;
use crate::progress::Progress;
use crate::tool::{Platform, ToolResolver};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A verified archive, where it goes, and the tool that will unpack it.
///
/// Jobs only come from [`ArchiveExtractor::prepare`], so the tool path has
/// always been resolved to an existing file:
///
/// ```compile_fail
/// use asset_deploy::ArchiveJob;
/// let job = ArchiveJob::new("lib.7z", "out", "/tmp/not-7z");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveJob {
    archive: PathBuf,
    destination: PathBuf,
    tool: PathBuf,
}

impl ArchiveJob {
    pub(crate) fn new(archive: impl Into<PathBuf>, destination: impl Into<PathBuf>, tool: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            destination: destination.into(),
            tool: tool.into(),
        }
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Tool arguments: extract with paths, output directory, overwrite all.
    pub fn args(&self) -> Vec<OsString> {
        let mut output_flag = OsString::from("-o");
        output_flag.push(self.destination.as_os_str());
        vec![
            OsString::from("x"),
            self.archive.clone().into_os_string(),
            output_flag,
            OsString::from("-aoa"),
        ]
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a program to completion, capturing its output.
pub trait ProcessRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> std::io::Result<ProcessOutput>;
}

/// Spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[OsString]) -> std::io::Result<ProcessOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Unpacks archives with the resolved tool.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor<R = SystemRunner> {
    resolver: ToolResolver,
    platform: Platform,
    runner: R,
    show_progress: bool,
}

impl ArchiveExtractor<SystemRunner> {
    /// Extractor for this process and platform.
    pub fn new() -> Self {
        Self::with_runner(ToolResolver::from_env(), Platform::current(), SystemRunner)
    }
}

impl Default for ArchiveExtractor<SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ProcessRunner> ArchiveExtractor<R> {
    pub fn with_runner(resolver: ToolResolver, platform: Platform, runner: R) -> Self {
        Self {
            resolver,
            platform,
            runner,
            show_progress: true,
        }
    }

    /// Disable the spinner.
    pub fn quiet(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Resolve the tool and build the job, with both paths made absolute.
    pub fn prepare(&self, archive: &Path, destination: &Path) -> Result<ArchiveJob> {
        let tool = self.resolver.resolve(self.platform)?;

        let archive = std::path::absolute(archive).map_err(|e| FetchError::io("resolve", archive, e))?;
        if !archive.is_file() {
            return Err(FetchError::io(
                "open archive",
                archive,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            ));
        }
        let destination =
            std::path::absolute(destination).map_err(|e| FetchError::io("resolve", destination, e))?;

        Ok(ArchiveJob::new(archive, destination, tool))
    }

    /// Extract `archive` into `destination`, creating it if needed.
    ///
    /// This is the only way to start the tool:
    ///
    /// ```compile_fail
    /// use asset_deploy::ArchiveExtractor;
    /// use std::path::Path;
    ///
    /// let extractor = ArchiveExtractor::new();
    /// let job = extractor.prepare(Path::new("lib.7z"), Path::new("out")).unwrap();
    /// extractor.run(&job).unwrap();
    /// ```
    pub fn extract(&self, archive: &Path, destination: &Path) -> Result<ArchiveJob> {
        let job = self.prepare(archive, destination)?;
        self.run(&job)?;
        Ok(job)
    }

    /// Invoke the tool for an already prepared job.
    fn run(&self, job: &ArchiveJob) -> Result<()> {
        std::fs::create_dir_all(job.destination())
            .map_err(|e| FetchError::io("create directory", job.destination(), e))?;

        let filename = job
            .archive()
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "archive".to_string());

        output::detail(&format!(
            "extracting {} to {} using {}",
            filename,
            job.destination().display(),
            job.tool().display()
        ));

        let out = {
            let _progress = Progress::spinner(self.show_progress, &format!("extracting {}", filename));
            self.runner
                .run(job.tool(), &job.args())
                .map_err(|e| FetchError::io("run", job.tool(), e))?
        };

        if !out.success() {
            return Err(FetchError::ExtractionProcess {
                archive: job.archive().to_path_buf(),
                code: out.code,
                stderr: out.stderr.trim().to_string(),
            });
        }

        for line in out.stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
            output::detail(line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::RefCell;

    /// Records invocations and answers with a canned result.
    struct FakeRunner {
        reply: ProcessOutput,
        calls: RefCell<Vec<(PathBuf, Vec<OsString>)>>,
    }

    impl FakeRunner {
        fn replying(code: i32, stdout: &str, stderr: &str) -> Self {
            Self {
                reply: ProcessOutput {
                    code: Some(code),
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ProcessRunner for FakeRunner {
        fn run(&self, program: &Path, args: &[OsString]) -> std::io::Result<ProcessOutput> {
            self.calls
                .borrow_mut()
                .push((program.to_path_buf(), args.to_vec()));
            Ok(self.reply.clone())
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        archive: PathBuf,
        tool: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("libraries.7z");
        std::fs::write(&archive, b"7z archive bytes").unwrap();
        let tool = dir.path().join("7z");
        std::fs::write(&tool, b"").unwrap();
        Fixture { dir, archive, tool }
    }

    fn extractor(cwd: &Path, runner: FakeRunner) -> ArchiveExtractor<FakeRunner> {
        let resolver = ToolResolver::new(cwd, None).with_system_paths(vec![]);
        ArchiveExtractor::with_runner(resolver, Platform::Linux, runner).quiet()
    }

    #[test]
    fn test_args_layout() {
        let job = ArchiveJob::new("/a/lib.7z", "/b/out", "/usr/bin/7z");
        assert_eq!(
            job.args(),
            vec![
                OsString::from("x"),
                OsString::from("/a/lib.7z"),
                OsString::from("-o/b/out"),
                OsString::from("-aoa"),
            ]
        );
    }

    #[test]
    fn test_extract_invokes_tool_once() {
        let fx = fixture();
        let dest = fx.dir.path().join("out/libraries");
        let ex = extractor(fx.dir.path(), FakeRunner::replying(0, "Everything is Ok\n", ""));

        let job = ex.extract(&fx.archive, &dest).unwrap();

        assert!(dest.is_dir());
        assert_eq!(job.tool(), fx.tool.as_path());
        let calls = ex.runner().calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, fx.tool);
        assert_eq!(calls[0].1, job.args());
    }

    #[test]
    fn test_missing_tool_fails_before_spawning() {
        let fx = fixture();
        std::fs::remove_file(&fx.tool).unwrap();
        let ex = extractor(fx.dir.path(), FakeRunner::replying(0, "", ""));

        let err = ex
            .extract(&fx.archive, &fx.dir.path().join("out"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
        assert!(ex.runner().calls.borrow().is_empty());
        assert!(!fx.dir.path().join("out").exists());
    }

    #[test]
    fn test_missing_tool_reported_before_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(dir.path(), FakeRunner::replying(0, "", ""));

        let err = ex
            .extract(&dir.path().join("nope.7z"), &dir.path().join("out"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
    }

    #[test]
    fn test_missing_archive_is_io_error() {
        let fx = fixture();
        let ex = extractor(fx.dir.path(), FakeRunner::replying(0, "", ""));

        let err = ex
            .extract(&fx.dir.path().join("nope.7z"), &fx.dir.path().join("out"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(ex.runner().calls.borrow().is_empty());
    }

    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let fx = fixture();
        let ex = extractor(
            fx.dir.path(),
            FakeRunner::replying(2, "", "ERROR: Data Error in encrypted file\n"),
        );

        let err = ex
            .extract(&fx.archive, &fx.dir.path().join("out"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ExtractionProcess);
        match &err {
            FetchError::ExtractionProcess { code, stderr, .. } => {
                assert_eq!(*code, Some(2));
                assert_eq!(stderr, "ERROR: Data Error in encrypted file");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ex.runner().calls.borrow().len(), 1);
    }

    #[test]
    fn test_prepare_makes_paths_absolute() {
        let fx = fixture();
        let ex = extractor(fx.dir.path(), FakeRunner::replying(0, "", ""));

        let job = ex.prepare(&fx.archive, Path::new("relative/out")).unwrap();
        assert!(job.archive().is_absolute());
        assert!(job.destination().is_absolute());
        assert!(job.destination().ends_with("relative/out"));
    }
}
