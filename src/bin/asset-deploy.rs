//! asset-deploy CLI - fetch, verify and unpack build assets
//!
//! Usage:
//!   asset-deploy fetch <url> --sha256 <hex>     Download and verify one file
//!   asset-deploy extract <archive> <dest>       Unpack an archive with 7-Zip
//!   asset-deploy hash <file>...                 Print SHA-256 digests
//!   asset-deploy tool                           Show which 7-Zip would be used
//!   asset-deploy deploy <manifest.toml>         Fetch and extract every asset

use anyhow::{Context, Result, bail};
use asset_deploy::manifest::validate_sha256;
use asset_deploy::transport::file_name_from_url;
use asset_deploy::{
    ArchiveExtractor, Deployer, DownloadTask, FetchOutcome, Manifest, MismatchPolicy, Platform,
    ResumableDownloader, SystemRunner, ToolResolver, config, hash, output,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "asset-deploy")]
#[command(about = "Resumable, integrity-verified asset fetch and deploy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file, resuming partial downloads, and verify its digest
    Fetch {
        /// HTTP(S) URL to download
        url: String,

        /// Expected SHA-256 digest (hex)
        #[arg(long)]
        sha256: String,

        /// Destination path (defaults to the URL's file name)
        #[arg(short = 'o', long = "output")]
        dest: Option<PathBuf>,

        /// Read size per transfer step, in bytes
        #[arg(long, default_value_t = config::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Attempts before giving up on network errors
        #[arg(long, default_value_t = config::DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,

        /// Keep the file when the digest does not match
        #[arg(long)]
        keep_corrupt: bool,
    },

    /// Extract an archive into a directory
    Extract {
        /// Archive to unpack
        archive: PathBuf,

        /// Output directory (created if missing)
        destination: PathBuf,

        /// Path to the 7-Zip binary (skips the search)
        #[arg(long)]
        tool: Option<PathBuf>,
    },

    /// Print the SHA-256 digest of each file
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the archive tool that would be used
    Tool {
        /// Platform layout to search (windows, linux, bsd, other)
        #[arg(long)]
        platform: Option<Platform>,
    },

    /// Fetch and extract every asset in a manifest
    Deploy {
        /// Manifest file (TOML with [[asset]] entries)
        manifest: PathBuf,

        /// Continue with the remaining assets after a failure
        #[arg(long)]
        keep_going: bool,

        /// Keep files whose digest does not match
        #[arg(long)]
        keep_corrupt: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            url,
            sha256,
            dest,
            chunk_size,
            max_attempts,
            keep_corrupt,
        } => {
            validate_sha256(&sha256)?;
            let destination = dest.unwrap_or_else(|| PathBuf::from(file_name_from_url(&url)));
            let task = DownloadTask::new(&url, &destination, &sha256)
                .with_chunk_size(chunk_size)
                .with_max_attempts(max_attempts);

            output::action(&format!("Fetching {}", url));
            let downloader = downloader(cli.quiet, keep_corrupt);
            let outcome = downloader
                .fetch(&task)
                .with_context(|| format!("Failed to fetch {}", url))?;
            report_fetch(&destination, outcome);
        }

        Commands::Extract {
            archive,
            destination,
            tool,
        } => {
            let mut resolver = ToolResolver::from_env();
            if tool.is_some() {
                resolver = resolver.with_explicit(tool);
            }
            let mut extractor = ArchiveExtractor::with_runner(resolver, Platform::current(), SystemRunner);
            if cli.quiet {
                extractor = extractor.quiet();
            }

            output::action(&format!("Extracting {}", archive.display()));
            let job = extractor
                .extract(&archive, &destination)
                .with_context(|| format!("Failed to extract {}", archive.display()))?;
            output::success(&format!("Extracted to {}", job.destination().display()));
        }

        Commands::Hash { files } => {
            for file in &files {
                let digest = hash::digest(file)?;
                println!("{}  {}", digest, file.display());
            }
        }

        Commands::Tool { platform } => {
            let platform = platform.unwrap_or_else(Platform::current);
            let path = ToolResolver::from_env().resolve(platform)?;
            println!("{}", path.display());
        }

        Commands::Deploy {
            manifest,
            keep_going,
            keep_corrupt,
        } => {
            deploy(&manifest, keep_going, keep_corrupt, cli.quiet)?;
        }
    }

    Ok(())
}

fn downloader(quiet: bool, keep_corrupt: bool) -> ResumableDownloader {
    let mut downloader = ResumableDownloader::new();
    if keep_corrupt {
        downloader = downloader.on_mismatch(MismatchPolicy::Keep);
    }
    if quiet {
        downloader = downloader.quiet();
    }
    downloader
}

fn report_fetch(destination: &Path, outcome: FetchOutcome) {
    match outcome {
        FetchOutcome::AlreadyPresent => {
            output::skip(&format!("{} already verified", destination.display()));
        }
        FetchOutcome::Downloaded { bytes, attempts } => {
            let tries = if attempts == 1 { "attempt" } else { "attempts" };
            output::success(&format!(
                "{} verified ({} bytes, {} {})",
                destination.display(),
                bytes,
                attempts,
                tries
            ));
        }
    }
}

/// Run a whole manifest; any failed or skipped asset fails the command.
fn deploy(path: &Path, keep_going: bool, keep_corrupt: bool, quiet: bool) -> Result<()> {
    let manifest = Manifest::load(path)?;
    if manifest.assets.is_empty() {
        output::info(&format!("No assets in {}", path.display()));
        return Ok(());
    }

    let mut extractor = ArchiveExtractor::new();
    if quiet {
        extractor = extractor.quiet();
    }
    let deployer = Deployer::with_parts(downloader(quiet, keep_corrupt), extractor);

    output::action(&format!(
        "Deploying {} asset(s) from {}",
        manifest.assets.len(),
        path.display()
    ));
    let report = deployer.deploy_all(&manifest, keep_going);

    for skipped in &report.skipped {
        output::skip(&format!("{} not attempted", skipped));
    }

    if !report.is_success() {
        bail!(
            "{} asset(s) failed, {} not attempted, {} deployed",
            report.failed.len(),
            report.skipped.len(),
            report.deployed.len()
        );
    }

    output::success(&format!("{} asset(s) deployed", report.deployed.len()));
    Ok(())
}
