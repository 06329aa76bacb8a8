//! Asset manifests and sequential deployment
//!
//! A manifest lists the archives a build tree needs:
//!
//! ```toml
//! [[asset]]
//! name = "libraries"
//! url = "https://example.com/libraries.7z"
//! destination = "third_party/libraries.7z"
//! sha256 = "..."
//! extract_to = "third_party/libraries"
//! ```
//!
//! Relative paths are resolved against the manifest's own directory. Assets
//! are processed one at a time, each fetched and verified before it is
//! extracted.

use crate::download::{DownloadTask, FetchOutcome, ResumableDownloader};
use crate::error::FetchError;
use crate::extract::{ArchiveExtractor, ProcessRunner, SystemRunner};
use crate::output;
use crate::transport::{Transport, UreqTransport};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Parsed manifest with paths already resolved.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(rename = "asset", default)]
    pub assets: Vec<AssetSpec>,
}

/// One `[[asset]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetSpec {
    pub name: Option<String>,
    pub url: String,
    pub destination: PathBuf,
    pub sha256: String,
    pub extract_to: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub chunk_size: Option<usize>,
}

impl AssetSpec {
    /// Name for reporting: explicit name, else the destination file name.
    pub fn label(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.destination
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.url.clone())
    }

    pub fn task(&self) -> DownloadTask {
        let mut task = DownloadTask::new(&self.url, &self.destination, &self.sha256);
        if let Some(attempts) = self.max_attempts {
            task = task.with_max_attempts(attempts);
        }
        if let Some(chunk_size) = self.chunk_size {
            task = task.with_chunk_size(chunk_size);
        }
        task
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        self.destination = base_dir.join(&self.destination);
        if let Some(extract_to) = &self.extract_to {
            self.extract_to = Some(base_dir.join(extract_to));
        }
    }
}

impl Manifest {
    /// Read and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::parse(&text, base_dir)
            .with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    /// Parse manifest text, resolving relative paths against `base_dir`.
    pub fn parse(text: &str, base_dir: &Path) -> Result<Self> {
        let mut manifest: Manifest = toml::from_str(text)?;

        for (i, asset) in manifest.assets.iter_mut().enumerate() {
            validate_sha256(&asset.sha256)
                .with_context(|| format!("asset #{} ({})", i + 1, asset.label()))?;
            crate::transport::validate_url(&asset.url)
                .with_context(|| format!("asset #{} ({})", i + 1, asset.label()))?;
            asset.resolve_paths(base_dir);
        }

        Ok(manifest)
    }
}

/// Reject anything that is not 64 hex digits.
pub fn validate_sha256(value: &str) -> Result<()> {
    let value = value.trim();
    if value.len() != 64 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("sha256 must be 64 hex characters, got '{}'", value);
    }
    Ok(())
}

/// What happened to one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReport {
    pub label: String,
    pub fetch: FetchOutcome,
    pub extracted_to: Option<PathBuf>,
}

/// Summary of a whole manifest run.
#[derive(Debug, Default)]
pub struct DeployReport {
    pub deployed: Vec<AssetReport>,
    pub failed: Vec<(String, FetchError)>,
    /// Assets never attempted because an earlier one failed.
    pub skipped: Vec<String>,
}

impl DeployReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Fetch-then-extract driver over a downloader and an extractor.
pub struct Deployer<T = UreqTransport, R = SystemRunner> {
    downloader: ResumableDownloader<T>,
    extractor: ArchiveExtractor<R>,
}

impl Deployer<UreqTransport, SystemRunner> {
    pub fn new() -> Self {
        Self::with_parts(ResumableDownloader::new(), ArchiveExtractor::new())
    }
}

impl Default for Deployer<UreqTransport, SystemRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport, R: ProcessRunner> Deployer<T, R> {
    pub fn with_parts(downloader: ResumableDownloader<T>, extractor: ArchiveExtractor<R>) -> Self {
        Self {
            downloader,
            extractor,
        }
    }

    pub fn downloader(&self) -> &ResumableDownloader<T> {
        &self.downloader
    }

    pub fn extractor(&self) -> &ArchiveExtractor<R> {
        &self.extractor
    }

    /// Fetch one asset and, if it names an `extract_to`, unpack it.
    pub fn deploy(&self, asset: &AssetSpec) -> std::result::Result<AssetReport, FetchError> {
        let fetch = self.downloader.fetch(&asset.task())?;

        let extracted_to = match &asset.extract_to {
            Some(dir) => {
                self.extractor.extract(&asset.destination, dir)?;
                Some(dir.clone())
            }
            None => None,
        };

        Ok(AssetReport {
            label: asset.label(),
            fetch,
            extracted_to,
        })
    }

    /// Deploy every asset in order.
    ///
    /// Stops at the first failure unless `keep_going` is set; the remaining
    /// assets are then listed in [`DeployReport::skipped`].
    pub fn deploy_all(&self, manifest: &Manifest, keep_going: bool) -> DeployReport {
        let mut report = DeployReport::default();
        let total = manifest.assets.len();

        for (i, asset) in manifest.assets.iter().enumerate() {
            let label = asset.label();
            if !report.failed.is_empty() && !keep_going {
                report.skipped.push(label);
                continue;
            }

            output::action_numbered(i + 1, total, &label);
            match self.deploy(asset) {
                Ok(asset_report) => report.deployed.push(asset_report),
                Err(err) => {
                    output::error(&format!("{}: {}", label, err));
                    report.failed.push((label, err));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_parse_resolves_relative_paths() {
        let text = format!(
            r#"
[[asset]]
name = "libraries"
url = "https://example.com/libraries.7z"
destination = "third_party/libraries.7z"
sha256 = "{SHA}"
extract_to = "third_party/libraries"
max_attempts = 5

[[asset]]
url = "https://example.com/assets.7z"
destination = "/abs/assets.7z"
sha256 = "{SHA}"
"#
        );

        let manifest = Manifest::parse(&text, Path::new("/repo")).unwrap();

        assert_eq!(manifest.assets.len(), 2);
        let first = &manifest.assets[0];
        assert_eq!(first.label(), "libraries");
        assert_eq!(first.destination, PathBuf::from("/repo/third_party/libraries.7z"));
        assert_eq!(first.extract_to, Some(PathBuf::from("/repo/third_party/libraries")));
        assert_eq!(first.task().max_attempts(), 5);

        let second = &manifest.assets[1];
        assert_eq!(second.label(), "assets.7z");
        assert_eq!(second.destination, PathBuf::from("/abs/assets.7z"));
        assert_eq!(second.extract_to, None);
        assert_eq!(second.task().max_attempts(), crate::config::DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_empty_manifest() {
        let manifest = Manifest::parse("", Path::new(".")).unwrap();
        assert!(manifest.assets.is_empty());
    }

    #[test]
    fn test_rejects_bad_hash() {
        let text = r#"
[[asset]]
url = "https://example.com/a.7z"
destination = "a.7z"
sha256 = "abc123"
"#;
        let err = Manifest::parse(text, Path::new(".")).unwrap_err();
        assert!(format!("{:#}", err).contains("64 hex characters"));
    }

    #[test]
    fn test_rejects_unsupported_url() {
        let text = format!(
            r#"
[[asset]]
url = "ftp://example.com/a.7z"
destination = "a.7z"
sha256 = "{SHA}"
"#
        );
        let err = Manifest::parse(&text, Path::new(".")).unwrap_err();
        assert!(format!("{:#}", err).contains("unsupported URL"));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let text = format!(
            r#"
[[asset]]
url = "https://example.com/a.7z"
destination = "a.7z"
sha256 = "{SHA}"
checksum = "md5"
"#
        );
        assert!(Manifest::parse(&text, Path::new(".")).is_err());
    }

    #[test]
    fn test_load_uses_manifest_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets.toml");
        std::fs::write(
            &path,
            format!(
                "[[asset]]\nurl = \"https://example.com/a.7z\"\ndestination = \"a.7z\"\nsha256 = \"{SHA}\"\n"
            ),
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert_eq!(manifest.assets[0].destination, dir.path().join("a.7z"));
    }

    #[test]
    fn test_validate_sha256() {
        assert!(validate_sha256(SHA).is_ok());
        assert!(validate_sha256(&SHA.to_uppercase()).is_ok());
        assert!(validate_sha256("").is_err());
        assert!(validate_sha256(&"g".repeat(64)).is_err());
    }
}
