//! Configuration for a fetch-compile-export run

use crate::{error::Error, explorer::is_hex_address, explorer::Network, utils::with_v_prefix};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

/// Main configuration for one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContragetConfig {
    /// Local `.sol`/`.vy` file, directory of them, or a contract address
    pub path: String,

    /// Contract name used for folders and output files
    /// Falls back to the explorer's contract name or the local file stem
    pub name: Option<String>,

    /// Compiler version overriding the one from explorer metadata or pragmas
    pub compiler_version: Option<String>,

    /// Network the contract address lives on
    pub network: Network,

    /// Where downloaded sources are written
    pub download_dst: PathBuf,

    /// Where the merged ABI and bytecode files go; skipped when unset
    pub objects_dst: Option<PathBuf>,

    /// Where the generated package goes; skipped when unset
    pub pkg_dst: Option<PathBuf>,

    /// Name overrides for the binding generator
    pub pkg_aliases: BTreeMap<String, String>,

    /// Extra arguments for every compiler invocation
    pub compiler_args: Vec<String>,

    /// Root of the compiler binary cache
    pub cache_dir: PathBuf,

    /// Timeout for a whole compiler binary download
    pub download_timeout_secs: u64,

    pub explorer: ExplorerConfig,
}

/// Block explorer access settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplorerConfig {
    pub api_key: Option<String>,

    /// Alternative Etherscan-compatible endpoint
    pub base_url: Option<String>,

    /// Timeout for a single HTTP request
    pub timeout_secs: u64,

    /// Retries after a transient HTTP failure
    pub retries: u32,
}

impl Default for ContragetConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            name: None,
            compiler_version: None,
            network: Network::default(),
            download_dst: std::env::temp_dir(),
            objects_dst: None,
            pkg_dst: None,
            pkg_aliases: BTreeMap::new(),
            compiler_args: Vec::new(),
            cache_dir: PathBuf::from("tmp"),
            download_timeout_secs: 600,
            explorer: ExplorerConfig::default(),
        }
    }
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout_secs: 30,
            retries: 3,
        }
    }
}

impl ExplorerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ContragetConfig {
    /// Reads a TOML file; missing keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    /// Whether `path` names something on the local disk
    pub fn is_local(&self) -> bool {
        Path::new(&self.path).exists()
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Compiler version override with a `v` prefix
    pub fn compiler_version(&self) -> Option<String> {
        self.compiler_version.as_deref().map(with_v_prefix)
    }

    /// Validates the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_path().wrap_err("validate contract path")?;

        if let Some(version) = &self.compiler_version {
            if version.trim().is_empty() {
                return Err(Error::Config("compiler version is empty".to_string()).into());
            }
        }

        if let Some(name) = &self.name {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(Error::Config(format!("invalid contract name: {name:?}")).into());
            }
        }

        if let Some((key, value)) = self
            .pkg_aliases
            .iter()
            .find(|(k, v)| k.trim().is_empty() || v.trim().is_empty())
        {
            return Err(Error::Config(format!("empty package alias: {key:?} = {value:?}")).into());
        }

        if self.explorer.timeout_secs == 0 {
            return Err(Error::Config("explorer timeout must be positive".to_string()).into());
        }

        if self.download_timeout_secs == 0 {
            return Err(Error::Config("download timeout must be positive".to_string()).into());
        }

        Ok(())
    }

    fn validate_path(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::Config("no contract path or address given".to_string()).into());
        }
        if !self.is_local() && !is_hex_address(&self.path) {
            return Err(Error::Config(format!(
                "{} is neither a local file nor a contract address",
                self.path
            ))
            .into());
        }
        Ok(())
    }

    /// Create a new builder for ContragetConfig
    pub fn builder() -> ContragetConfigBuilder {
        ContragetConfigBuilder::default()
    }
}

/// Builder for creating ContragetConfig with a fluent API
#[derive(Default)]
pub struct ContragetConfigBuilder {
    config: ContragetConfig,
}

impl ContragetConfigBuilder {
    /// Start from an existing configuration, e.g. one read from a file
    pub fn from_config(config: ContragetConfig) -> Self {
        Self { config }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn compiler_version(mut self, version: impl Into<String>) -> Self {
        self.config.compiler_version = Some(version.into());
        self
    }

    pub fn network(mut self, network: Network) -> Self {
        self.config.network = network;
        self
    }

    pub fn download_dst(mut self, path: PathBuf) -> Self {
        self.config.download_dst = path;
        self
    }

    pub fn objects_dst(mut self, path: PathBuf) -> Self {
        self.config.objects_dst = Some(path);
        self
    }

    pub fn pkg_dst(mut self, path: PathBuf) -> Self {
        self.config.pkg_dst = Some(path);
        self
    }

    /// Add a single alias
    pub fn pkg_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.config.pkg_aliases.insert(from.into(), to.into());
        self
    }

    pub fn compiler_args(mut self, args: Vec<String>) -> Self {
        self.config.compiler_args = args;
        self
    }

    pub fn cache_dir(mut self, path: PathBuf) -> Self {
        self.config.cache_dir = path;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.explorer.api_key = Some(key.into());
        self
    }

    /// Configure explorer access
    pub fn explorer(mut self, configure: impl FnOnce(&mut ExplorerConfig)) -> Self {
        configure(&mut self.config.explorer);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<ContragetConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ADDRESS: &str = "0xdAC17F958D2ee523a2206206994597C13D831ec7";

    #[test]
    fn test_defaults() {
        let config = ContragetConfig::default();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.cache_dir, PathBuf::from("tmp"));
        assert_eq!(config.download_dst, std::env::temp_dir());
        assert!(config.objects_dst.is_none());
        assert_eq!(config.explorer.retries, 3);
        assert_eq!(config.explorer.timeout(), Duration::from_secs(30));
        assert_eq!(config.download_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_builder() {
        let config = ContragetConfig::builder()
            .path(ADDRESS)
            .name("Tether")
            .compiler_version("0.4.18")
            .network(Network::Goerli)
            .pkg_alias("transfer(address,address,uint256)", "transferFrom")
            .explorer(|e| e.retries = 0)
            .build()
            .unwrap();

        assert_eq!(config.compiler_version().as_deref(), Some("v0.4.18"));
        assert_eq!(config.network, Network::Goerli);
        assert_eq!(config.pkg_aliases.len(), 1);
        assert_eq!(config.explorer.retries, 0);
        assert!(!config.is_local());
    }

    #[test]
    fn test_validate_path() {
        let err = ContragetConfig::builder().build().unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));

        let err = ContragetConfig::builder().path("./missing/Token.sol").build().unwrap_err();
        assert_eq!(err.to_string(), "validate contract path");

        let temp_dir = TempDir::new().unwrap();
        let local = temp_dir.path().join("Token.sol");
        std::fs::write(&local, "contract Token {}").unwrap();
        let config = ContragetConfig::builder()
            .path(local.to_string_lossy())
            .build()
            .unwrap();
        assert!(config.is_local());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = || ContragetConfig::builder().path(ADDRESS);

        assert!(base().name("a/b").build().is_err());
        assert!(base().compiler_version(" ").build().is_err());
        assert!(base().pkg_alias("transfer", "").build().is_err());
        assert!(base().explorer(|e| e.timeout_secs = 0).build().is_err());
        assert!(base().download_timeout_secs(0).build().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("contraget.toml");
        std::fs::write(
            &path,
            r#"
path = "0xdAC17F958D2ee523a2206206994597C13D831ec7"
network = "rinkeby"
objects_dst = "out"
compiler_args = ["--evm-version", "london"]
download_timeout_secs = 900

[pkg_aliases]
"transfer(address,address,uint256)" = "transferFrom"

[explorer]
api_key = "KEY"
timeout_secs = 5
"#,
        )
        .unwrap();

        let config = ContragetConfig::from_toml_file(&path).unwrap();

        assert_eq!(config.network, Network::Rinkeby);
        assert_eq!(config.objects_dst, Some(PathBuf::from("out")));
        assert_eq!(config.compiler_args, ["--evm-version", "london"]);
        assert_eq!(config.explorer.api_key.as_deref(), Some("KEY"));
        assert_eq!(config.explorer.timeout(), Duration::from_secs(5));
        assert_eq!(config.download_timeout(), Duration::from_secs(900));
        // unset keys keep defaults
        assert_eq!(config.explorer.retries, 3);
        assert_eq!(config.cache_dir, PathBuf::from("tmp"));
        config.validate().unwrap();
    }

    #[test]
    fn test_from_toml_file_invalid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("contraget.toml");
        std::fs::write(&path, "network = \"ropsten\"").unwrap();

        let err = ContragetConfig::from_toml_file(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
    }
}
