//! Compiler binary resolution with an on-disk, per-version cache
//!
//! Binaries are cached as `<cache root>/<solc|vyper>/<version>`. A download is
//! written to a temporary file next to its final location and only moved into
//! place once the whole body has been received, so an interrupted download
//! never looks like a valid cache entry.

use crate::{error::Error, http::HttpClient};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    io::Write,
    path::{Path, PathBuf},
};

/// Source contract language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Solidity,
    Vyper,
}

impl Dialect {
    /// `.sol` files are Solidity, everything else is handed to Vyper
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("sol") => Dialect::Solidity,
            _ => Dialect::Vyper,
        }
    }

    /// Directory name used inside the compiler cache
    pub fn cache_segment(&self) -> &'static str {
        match self {
            Dialect::Solidity => "solc",
            Dialect::Vyper => "vyper",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Dialect::Solidity => "sol",
            Dialect::Vyper => "vy",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Solidity => f.write_str("Solidity"),
            Dialect::Vyper => f.write_str("Vyper"),
        }
    }
}

/// Operating systems with published compiler binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "linux" => Ok(Platform::Linux),
            "macos" => Ok(Platform::MacOs),
            other => Err(Error::UnsupportedTarget(format!("unsupported OS: {other}")).into()),
        }
    }
}

/// Vyper release assets carry the commit in their name, so only versions
/// listed here can be downloaded.
const VYPER_BUILDS: &[(&str, &str)] = &[
    ("v0.2.4", "0.2.4+commit.7949850"),
    ("v0.2.5", "0.2.5+commit.a0c561c"),
];

/// Looks up the release build identifier for a Vyper version
pub fn vyper_build_id(version: &str) -> Result<&'static str> {
    VYPER_BUILDS
        .iter()
        .find(|(known, _)| *known == version)
        .map(|(_, build)| *build)
        .ok_or_else(|| {
            Error::UnsupportedTarget(format!("unrecognized Vyper version: {version}")).into()
        })
}

/// Release asset URL for a compiler version on a platform
pub fn download_url(dialect: Dialect, version: &str, platform: Platform) -> Result<String> {
    match dialect {
        Dialect::Solidity => {
            let asset = match platform {
                Platform::Linux => "solc-static-linux",
                Platform::MacOs => "solc-macos",
            };
            Ok(format!(
                "https://github.com/ethereum/solidity/releases/download/{version}/{asset}"
            ))
        }
        Dialect::Vyper => {
            let build = vyper_build_id(version)?;
            let suffix = match platform {
                Platform::Linux => "linux",
                Platform::MacOs => "darwin",
            };
            Ok(format!(
                "https://github.com/vyperlang/vyper/releases/download/{version}/vyper.{build}.{suffix}"
            ))
        }
    }
}

/// Something that can stream a remote binary into a writer
pub trait BinaryFetcher {
    fn fetch(&self, url: &str, out: &mut dyn Write) -> Result<u64>;
}

impl BinaryFetcher for HttpClient {
    fn fetch(&self, url: &str, out: &mut dyn Write) -> Result<u64> {
        self.download(url, out)
    }
}

/// Location of cached compiler binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerCache {
    root: PathBuf,
}

impl CompilerCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, dialect: Dialect, version: &str) -> PathBuf {
        self.root.join(dialect.cache_segment()).join(version)
    }

    /// A cache entry is reusable when it is a non-empty regular file
    pub fn is_valid(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }
}

impl Default for CompilerCache {
    fn default() -> Self {
        Self::new("tmp")
    }
}

/// Ensures a compiler binary for an exact version is available locally
#[derive(Debug)]
pub struct CompilerResolver<F> {
    cache: CompilerCache,
    fetcher: F,
    os: String,
}

impl<F: BinaryFetcher> CompilerResolver<F> {
    pub fn new(cache: CompilerCache, fetcher: F) -> Self {
        Self {
            cache,
            fetcher,
            os: std::env::consts::OS.to_string(),
        }
    }

    /// Pretend to run on another OS
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    pub fn cache(&self) -> &CompilerCache {
        &self.cache
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Returns the path of an executable compiler for `version`, downloading
    /// it on a cache miss
    pub fn resolve(&self, version: &str, dialect: Dialect) -> Result<PathBuf> {
        validate_version(version)?;

        let path = self.cache.entry_path(dialect, version);
        if CompilerCache::is_valid(&path) {
            tracing::debug!("Using cached {} compiler: {}", dialect, path.display());
            return Ok(path);
        }

        // Fail on unsupported targets before touching the network
        let platform = Platform::from_os(&self.os)?;
        let url = download_url(dialect, version, platform)?;

        tracing::info!("Downloading {} version {}", dialect.cache_segment(), version);
        self.download_to(&url, &path)
            .wrap_err_with(|| format!("download {} {}", dialect.cache_segment(), version))?;

        Ok(path)
    }

    fn download_to(&self, url: &str, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| Error::Config(format!("invalid cache path: {}", path.display())))?;
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        let mut staging = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
        let size = self.fetcher.fetch(url, staging.as_file_mut())?;
        if size == 0 {
            return Err(Error::Download {
                url: url.to_string(),
                reason: "empty response body".to_string(),
            }
            .into());
        }
        staging
            .as_file_mut()
            .flush()
            .map_err(|e| Error::io(staging.path(), e))?;

        make_executable(staging.path())?;
        staging
            .persist(path)
            .map_err(|e| Error::io(path, e.error))?;

        tracing::debug!("Saved {} bytes to {}", size, path.display());
        Ok(())
    }
}

/// Versions become file names, so refuse anything that could escape the cache
fn validate_version(version: &str) -> Result<()> {
    let valid = !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
        && !version.contains("..");
    if valid {
        Ok(())
    } else {
        Err(Error::UnsupportedTarget(format!("invalid compiler version: {version:?}")).into())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| Error::io(path, e))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// Records requested URLs and serves a fixed body
    #[derive(Default)]
    pub(crate) struct FakeFetcher {
        pub body: Vec<u8>,
        pub fail: bool,
        pub requests: RefCell<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn serving(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                ..Default::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                body: b"partial".to_vec(),
                fail: true,
                ..Default::default()
            }
        }
    }

    impl BinaryFetcher for FakeFetcher {
        fn fetch(&self, url: &str, out: &mut dyn Write) -> Result<u64> {
            self.requests.borrow_mut().push(url.to_string());
            out.write_all(&self.body)?;
            if self.fail {
                return Err(Error::Download {
                    url: url.to_string(),
                    reason: "connection reset".to_string(),
                }
                .into());
            }
            Ok(self.body.len() as u64)
        }
    }

    #[test]
    fn test_download_urls() {
        assert_eq!(
            download_url(Dialect::Solidity, "v0.8.10", Platform::Linux).unwrap(),
            "https://github.com/ethereum/solidity/releases/download/v0.8.10/solc-static-linux"
        );
        assert_eq!(
            download_url(Dialect::Solidity, "v0.8.10", Platform::MacOs).unwrap(),
            "https://github.com/ethereum/solidity/releases/download/v0.8.10/solc-macos"
        );
        assert_eq!(
            download_url(Dialect::Vyper, "v0.2.4", Platform::Linux).unwrap(),
            "https://github.com/vyperlang/vyper/releases/download/v0.2.4/vyper.0.2.4+commit.7949850.linux"
        );
        assert_eq!(
            download_url(Dialect::Vyper, "v0.2.5", Platform::MacOs).unwrap(),
            "https://github.com/vyperlang/vyper/releases/download/v0.2.5/vyper.0.2.5+commit.a0c561c.darwin"
        );
    }

    #[test]
    fn test_dialect_from_path() {
        assert_eq!(Dialect::from_path(Path::new("a/Token.sol")), Dialect::Solidity);
        assert_eq!(Dialect::from_path(Path::new("a/token.vy")), Dialect::Vyper);
    }

    #[test]
    fn test_resolve_downloads_once() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = CompilerResolver::new(
            CompilerCache::new(temp_dir.path()),
            FakeFetcher::serving(b"#!/bin/sh\n"),
        )
        .with_os("linux");

        let first = resolver.resolve("v0.8.10", Dialect::Solidity).unwrap();
        let second = resolver.resolve("v0.8.10", Dialect::Solidity).unwrap();

        assert_eq!(first, temp_dir.path().join("solc").join("v0.8.10"));
        assert_eq!(first, second);
        assert_eq!(resolver.fetcher().requests.borrow().len(), 1);
        assert_eq!(std::fs::read(&first).unwrap(), b"#!/bin/sh\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&first).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_unknown_vyper_version_fails_before_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = CompilerResolver::new(
            CompilerCache::new(temp_dir.path()),
            FakeFetcher::serving(b"bin"),
        )
        .with_os("linux");

        let err = resolver.resolve("v0.3.99", Dialect::Vyper).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnsupportedTarget(_))
        ));
        assert!(resolver.fetcher().requests.borrow().is_empty());
    }

    #[test]
    fn test_unsupported_os_fails_before_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = CompilerResolver::new(
            CompilerCache::new(temp_dir.path()),
            FakeFetcher::serving(b"bin"),
        )
        .with_os("windows");

        let err = resolver.resolve("v0.8.10", Dialect::Solidity).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnsupportedTarget(_))
        ));
        assert!(resolver.fetcher().requests.borrow().is_empty());
    }

    #[test]
    fn test_failed_download_leaves_no_cache_entry() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = CompilerResolver::new(
            CompilerCache::new(temp_dir.path()),
            FakeFetcher::failing(),
        )
        .with_os("linux");

        let err = resolver.resolve("v0.8.10", Dialect::Solidity).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Download { .. })
        ));

        let entry = resolver.cache().entry_path(Dialect::Solidity, "v0.8.10");
        assert!(!entry.exists());
        assert!(!CompilerCache::is_valid(&entry));
        // staging file is cleaned up as well
        assert_eq!(std::fs::read_dir(entry.parent().unwrap()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_cache_entry_is_refetched() {
        let temp_dir = TempDir::new().unwrap();
        let cache = CompilerCache::new(temp_dir.path());
        let entry = cache.entry_path(Dialect::Vyper, "v0.2.4");
        std::fs::create_dir_all(entry.parent().unwrap()).unwrap();
        std::fs::write(&entry, b"").unwrap();

        let resolver =
            CompilerResolver::new(cache, FakeFetcher::serving(b"vyper")).with_os("macos");
        resolver.resolve("v0.2.4", Dialect::Vyper).unwrap();

        assert_eq!(
            resolver.fetcher().requests.borrow().as_slice(),
            ["https://github.com/vyperlang/vyper/releases/download/v0.2.4/vyper.0.2.4+commit.7949850.darwin"]
        );
        assert_eq!(std::fs::read(&entry).unwrap(), b"vyper");
    }

    #[test]
    fn test_rejects_path_like_versions() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = CompilerResolver::new(
            CompilerCache::new(temp_dir.path()),
            FakeFetcher::serving(b"bin"),
        );

        assert!(resolver.resolve("../../etc", Dialect::Solidity).is_err());
        assert!(resolver.resolve("", Dialect::Solidity).is_err());
    }
}
