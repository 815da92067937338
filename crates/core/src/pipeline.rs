//! End-to-end run: sources, compilation, collection, export

use crate::{
    artifacts::{self, export_abi, export_bin, export_package, BindingGenerator, RustBindingGenerator},
    compiler::Compiler,
    config::ContragetConfig,
    error::Error,
    explorer::{EtherscanClient, SourceFetcher},
    http::HttpClient,
    resolver::{BinaryFetcher, CompilerCache, CompilerResolver},
    source::{self, ContractFileSet},
    utils::capitalize,
};
use eyre::{Result, WrapErr};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::info;

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub files: usize,
    /// Contract types in artifact order
    pub contracts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abi_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bin_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_path: Option<PathBuf>,
}

/// Wires the explorer, compiler and exporters together for one configuration
pub struct Pipeline<S, F> {
    config: ContragetConfig,
    explorer: S,
    compiler: Compiler<F>,
    generator: Box<dyn BindingGenerator>,
}

impl Pipeline<EtherscanClient, HttpClient> {
    /// Pipeline talking to the real explorer and release servers
    pub fn from_config(config: ContragetConfig) -> Result<Self> {
        config.validate()?;

        let http = HttpClient::new(config.explorer.timeout(), config.explorer.retries)?;
        let mut explorer = EtherscanClient::new(http, config.explorer.api_key.clone());
        if let Some(base_url) = &config.explorer.base_url {
            explorer = explorer.with_base_url(base_url.clone());
        }
        // compiler binaries are tens of megabytes
        let downloads = HttpClient::new(config.download_timeout(), config.explorer.retries)?;
        let resolver = CompilerResolver::new(CompilerCache::new(&config.cache_dir), downloads);

        Ok(Self::new(config, explorer, resolver))
    }
}

impl<S: SourceFetcher, F: BinaryFetcher> Pipeline<S, F> {
    pub fn new(config: ContragetConfig, explorer: S, resolver: CompilerResolver<F>) -> Self {
        let compiler = Compiler::new(resolver).with_args(config.compiler_args.clone());
        Self {
            config,
            explorer,
            compiler,
            generator: Box::new(RustBindingGenerator),
        }
    }

    /// Replace the default Rust binding generator
    pub fn with_generator(mut self, generator: Box<dyn BindingGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &ContragetConfig {
        &self.config
    }

    /// Determines the contract name and the files to compile
    pub fn resolve_files(&self) -> Result<(String, ContractFileSet)> {
        let version = self.config.compiler_version();

        if self.config.is_local() {
            let path = Path::new(&self.config.path);
            let name = match &self.config.name {
                Some(name) => name.clone(),
                None => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::Config(format!("cannot derive a name from {}", path.display()))
                    })?,
            };
            let files = ContractFileSet::from_local(path, version.as_deref())
                .wrap_err("read local contracts")?;
            return Ok((capitalize(&name), files));
        }

        let record = self
            .explorer
            .fetch_source(self.config.network, &self.config.path)
            .wrap_err("download contract")?;

        let name = self
            .config
            .name
            .clone()
            .or_else(|| Some(record.contract_name.clone()).filter(|n| !n.trim().is_empty()))
            .ok_or_else(|| Error::Config("explorer returned no contract name, pass one".to_string()))?;
        let name = capitalize(&name);

        let mut files = source::normalize(&record, &self.config.download_dst, &name)
            .wrap_err("write contract sources")?;

        if let Some(version) = version {
            info!("Compiler version overridden: {}", version);
            let mut overridden = ContractFileSet::new();
            for (path, _) in files.iter() {
                overridden.insert(path, &version);
            }
            files = overridden;
        }

        Ok((name, files))
    }

    /// Runs the whole pipeline
    pub fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();

        let (name, files) = self.resolve_files()?;
        let contracts = self.compiler.compile(&files).wrap_err("get contract objects")?;
        let artifacts = artifacts::collect(&contracts)?;

        let mut summary = RunSummary {
            name: name.clone(),
            files: files.len(),
            contracts: artifacts.types.clone(),
            abi_path: None,
            bin_paths: Vec::new(),
            package_path: None,
        };

        match &self.config.pkg_dst {
            Some(pkg_dst) => {
                let path = export_package(
                    pkg_dst,
                    &name,
                    &artifacts,
                    &self.config.pkg_aliases,
                    self.generator.as_ref(),
                )
                .wrap_err("export package")?;
                summary.package_path = Some(path);
            }
            None => info!("No package destination set, skipping package generation"),
        }

        if let Some(objects_dst) = &self.config.objects_dst {
            summary.abi_path =
                Some(export_abi(objects_dst, &name, &artifacts.abis).wrap_err("export ABI")?);
            summary.bin_paths =
                export_bin(objects_dst, &artifacts.types, &artifacts.bins).wrap_err("export bin")?;
        }

        info!(
            "Processed {} in {:.2}s: {} contract(s)",
            name,
            start.elapsed().as_secs_f64(),
            summary.contracts.len()
        );
        Ok(summary)
    }
}
