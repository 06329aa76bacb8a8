//! Archive tool discovery
//!
//! The archive tool is 7-Zip. Candidates are tried in order:
//!
//! 1. the working directory
//! 2. the directory holding this executable
//! 3. well-known system locations for the platform
//!
//! The first candidate that exists as a file wins. `ASSET_TOOL` replaces the
//! whole search with one explicit path.

use crate::config;
use crate::error::{FetchError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Operating system families with distinct tool layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Linux,
    Bsd,
    Other,
}

impl Platform {
    /// Platform this binary was compiled for.
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Map a `std::env::consts::OS` value to a platform family.
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "linux" | "android" => Self::Linux,
            "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Self::Bsd,
            _ => Self::Other,
        }
    }

    /// File name of the tool binary.
    pub fn tool_name(self) -> &'static str {
        match self {
            Self::Windows => "7z.exe",
            Self::Linux | Self::Bsd | Self::Other => "7z",
        }
    }

    /// Well-known install locations, most likely first.
    pub fn system_paths(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &[
                r"C:\Program Files\7-Zip\7z.exe",
                r"C:\Program Files (x86)\7-Zip\7z.exe",
            ],
            Self::Linux => &["/usr/bin/7z", "/usr/local/bin/7z", "/usr/lib/p7zip/7z"],
            Self::Bsd => &["/usr/local/bin/7z", "/usr/pkg/bin/7z"],
            Self::Other => &["/usr/local/bin/7z", "/opt/homebrew/bin/7z", "/usr/bin/7z"],
        }
    }

    /// Full search order for this platform.
    pub fn search_order(
        self,
        cwd: &Path,
        install_dir: Option<&Path>,
        system_paths: &[PathBuf],
    ) -> Vec<PathBuf> {
        let name = self.tool_name();
        let mut order = vec![cwd.join(name)];
        if let Some(dir) = install_dir {
            order.push(dir.join(name));
        }
        order.extend(system_paths.iter().cloned());
        order.dedup();
        order
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Bsd => "bsd",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "bsd" => Ok(Self::Bsd),
            "other" => Ok(Self::Other),
            other => Err(format!(
                "unknown platform '{}' (expected windows, linux, bsd or other)",
                other
            )),
        }
    }
}

/// Locates the archive tool for a [`Platform`].
#[derive(Debug, Clone)]
pub struct ToolResolver {
    cwd: PathBuf,
    install_dir: Option<PathBuf>,
    system_paths: Option<Vec<PathBuf>>,
    explicit: Option<PathBuf>,
}

impl ToolResolver {
    pub fn new(cwd: impl Into<PathBuf>, install_dir: Option<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            install_dir,
            system_paths: None,
            explicit: None,
        }
    }

    /// Resolver for this process: its working directory, its executable's
    /// directory, and `ASSET_TOOL` if set.
    pub fn from_env() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self::new(cwd, install_dir).with_explicit(config::tool_override())
    }

    /// Replace the platform's well-known locations.
    pub fn with_system_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.system_paths = Some(paths);
        self
    }

    /// Use exactly this tool path instead of searching.
    pub fn with_explicit(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    /// Every path `resolve` would try, in order.
    pub fn candidates(&self, platform: Platform) -> Vec<PathBuf> {
        if let Some(explicit) = &self.explicit {
            return vec![explicit.clone()];
        }
        let system_paths = match &self.system_paths {
            Some(paths) => paths.clone(),
            None => platform.system_paths().iter().map(PathBuf::from).collect(),
        };
        platform.search_order(&self.cwd, self.install_dir.as_deref(), &system_paths)
    }

    /// First existing candidate, or [`FetchError::ToolNotFound`].
    pub fn resolve(&self, platform: Platform) -> Result<PathBuf> {
        let candidates = self.candidates(platform);
        match candidates.iter().find(|p| p.is_file()) {
            Some(found) => Ok(found.clone()),
            None => Err(FetchError::ToolNotFound {
                searched: candidates,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_from_os() {
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(Platform::from_os("freebsd"), Platform::Bsd);
        assert_eq!(Platform::from_os("openbsd"), Platform::Bsd);
        assert_eq!(Platform::from_os("macos"), Platform::Other);
    }

    #[test]
    fn test_platform_round_trips_through_str() {
        for platform in [Platform::Windows, Platform::Linux, Platform::Bsd, Platform::Other] {
            assert_eq!(platform.to_string().parse::<Platform>().unwrap(), platform);
        }
        assert!("amiga".parse::<Platform>().is_err());
    }

    #[test]
    fn test_tool_name_per_platform() {
        assert_eq!(Platform::Windows.tool_name(), "7z.exe");
        assert_eq!(Platform::Linux.tool_name(), "7z");
        assert_ne!(Platform::Windows.system_paths(), Platform::Linux.system_paths());
        assert_ne!(Platform::Linux.system_paths(), Platform::Bsd.system_paths());
    }

    #[test]
    fn test_search_order() {
        let order = Platform::Linux.search_order(
            Path::new("/work"),
            Some(Path::new("/opt/tools")),
            &[PathBuf::from("/usr/bin/7z")],
        );
        assert_eq!(
            order,
            vec![
                PathBuf::from("/work/7z"),
                PathBuf::from("/opt/tools/7z"),
                PathBuf::from("/usr/bin/7z"),
            ]
        );
    }

    #[test]
    fn test_cwd_wins_over_install_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("cwd");
        let install = dir.path().join("install");
        touch(&cwd.join("7z"));
        touch(&install.join("7z"));

        let resolver = ToolResolver::new(&cwd, Some(install)).with_system_paths(vec![]);
        assert_eq!(resolver.resolve(Platform::Linux).unwrap(), cwd.join("7z"));
    }

    #[test]
    fn test_install_dir_then_system_path() {
        let dir = tempfile::tempdir().unwrap();
        let cwd = dir.path().join("cwd");
        let install = dir.path().join("install");
        let system = dir.path().join("system/7z");
        std::fs::create_dir_all(&cwd).unwrap();
        touch(&system);

        let resolver =
            ToolResolver::new(&cwd, Some(install.clone())).with_system_paths(vec![system.clone()]);
        assert_eq!(resolver.resolve(Platform::Linux).unwrap(), system);

        touch(&install.join("7z"));
        assert_eq!(resolver.resolve(Platform::Linux).unwrap(), install.join("7z"));
    }

    #[test]
    fn test_platform_selects_binary_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("7z.exe"));

        let resolver = ToolResolver::new(dir.path(), None).with_system_paths(vec![]);
        assert_eq!(
            resolver.resolve(Platform::Windows).unwrap(),
            dir.path().join("7z.exe")
        );
        assert!(resolver.resolve(Platform::Linux).is_err());
    }

    #[test]
    fn test_not_found_reports_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ToolResolver::new(dir.path(), Some(dir.path().join("bin")))
            .with_system_paths(vec![dir.path().join("sys/7z")]);

        let err = resolver.resolve(Platform::Linux).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolNotFound);
        match err {
            FetchError::ToolNotFound { searched } => assert_eq!(searched.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_directory_is_not_a_tool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("7z")).unwrap();
        let resolver = ToolResolver::new(dir.path(), None).with_system_paths(vec![]);
        assert!(resolver.resolve(Platform::Linux).is_err());
    }

    #[test]
    fn test_explicit_path_replaces_search() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("7z"));
        let explicit = dir.path().join("custom/7zz");

        let resolver = ToolResolver::new(dir.path(), None).with_explicit(Some(explicit.clone()));
        assert_eq!(resolver.candidates(Platform::Linux), vec![explicit.clone()]);
        assert!(resolver.resolve(Platform::Linux).is_err());

        touch(&explicit);
        assert_eq!(resolver.resolve(Platform::Linux).unwrap(), explicit);
    }
}
