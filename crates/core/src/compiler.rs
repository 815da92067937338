//! Compilation of Solidity and Vyper sources through external compilers

use crate::{
    error::Error,
    resolver::{BinaryFetcher, CompilerResolver, Dialect},
    source::ContractFileSet,
    utils::{capitalize, strip_hex_prefix, with_hex_prefix},
};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::Command,
    time::Instant,
};

/// Output fields requested from `solc --combined-json`
const SOLC_COMBINED_OUTPUT: &str = "abi,bin,bin-runtime,hashes";

/// Compiled contract, identical in shape for both dialects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledContract {
    /// `file:Contract` for Solidity, the Pascal-cased file stem for Vyper
    pub name: String,
    /// ABI definition as emitted by the compiler
    pub abi: Value,
    /// Creation bytecode, `0x`-prefixed
    pub bytecode: String,
    /// Runtime bytecode, `0x`-prefixed
    pub runtime_bytecode: String,
    /// Method selector (8 hex chars) to signature
    pub signatures: BTreeMap<String, String>,
    /// Compiler version that produced this output
    pub compiler_version: String,
}

impl CompiledContract {
    /// Contract name without the file qualifier
    pub fn bare_name(&self) -> &str {
        bare_name(&self.name)
    }
}

/// Last `:`-separated segment of a qualified name
pub fn bare_name(qualified: &str) -> &str {
    qualified.rsplit(':').next().unwrap_or(qualified)
}

/// Compiled contracts keyed by qualified name
pub type ContractMap = BTreeMap<String, CompiledContract>;

/// Runs the right compiler for every file of a [`ContractFileSet`]
#[derive(Debug)]
pub struct Compiler<F> {
    resolver: CompilerResolver<F>,
    extra_args: Vec<String>,
}

impl<F: BinaryFetcher> Compiler<F> {
    pub fn new(resolver: CompilerResolver<F>) -> Self {
        Self {
            resolver,
            extra_args: Vec::new(),
        }
    }

    /// Additional arguments passed to every compiler invocation
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    pub fn resolver(&self) -> &CompilerResolver<F> {
        &self.resolver
    }

    /// Compiles every file and merges the results
    ///
    /// Files are compiled one after another; the first failure aborts the
    /// batch. A qualified name produced by several files keeps the last one.
    pub fn compile(&self, files: &ContractFileSet) -> Result<ContractMap> {
        let start = Instant::now();
        let mut contracts = ContractMap::new();

        for (path, version) in files.iter() {
            let dialect = Dialect::from_path(path);
            tracing::info!("Compiling {} with {} {}", path.display(), dialect, version);

            let compiled = match dialect {
                Dialect::Solidity => {
                    let solc = self
                        .resolver
                        .resolve(version, dialect)
                        .wrap_err("download solc")?;
                    self.compile_solidity(&solc, path, version)
                        .wrap_err("build Solidity contract")?
                }
                Dialect::Vyper => {
                    let vyper = self
                        .resolver
                        .resolve(version, dialect)
                        .wrap_err("download vyper")?;
                    self.compile_vyper(&vyper, path, version)
                        .wrap_err("build Vyper contract")?
                }
            };

            for (name, contract) in compiled {
                if contracts.insert(name.clone(), contract).is_some() {
                    tracing::warn!(
                        "{} is produced by more than one file, keeping the output of {}",
                        name,
                        path.display()
                    );
                }
            }
        }

        tracing::info!(
            "Compiled {} contract(s) from {} file(s) in {:.2}s",
            contracts.len(),
            files.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(contracts)
    }

    fn compile_solidity(&self, solc: &Path, path: &Path, version: &str) -> Result<ContractMap> {
        let mut args = vec![
            "--combined-json".to_string(),
            SOLC_COMBINED_OUTPUT.to_string(),
            "--optimize".to_string(),
            "--allow-paths".to_string(),
            ".".to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());

        let stdout = run_compiler(Dialect::Solidity, solc, path, &args)?;
        parse_solc_output(&stdout, path, version)
    }

    fn compile_vyper(&self, vyper: &Path, path: &Path, version: &str) -> Result<ContractMap> {
        let mut args = vec!["-f".to_string(), "combined_json".to_string()];
        args.extend(self.extra_args.iter().cloned());

        let stdout = run_compiler(Dialect::Vyper, vyper, path, &args)?;
        parse_vyper_output(&stdout, path, version)
    }
}

/// Runs `executable <args> <file name>` inside the file's directory so that
/// flattened `./X.sol` imports resolve
fn run_compiler(dialect: Dialect, executable: &Path, path: &Path, args: &[String]) -> Result<String> {
    let (dir, file_name) = split_source_path(path)?;
    let executable = std::path::absolute(executable).map_err(|e| Error::io(executable, e))?;

    let mut cmd = Command::new(&executable);
    cmd.args(args).arg(file_name);
    if let Some(dir) = &dir {
        cmd.current_dir(dir);
    }

    tracing::debug!("Running compiler command: {:?}", cmd);

    let output = cmd.output().map_err(|e| Error::io(&executable, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let diagnostics = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };

        return Err(Error::Compile {
            dialect,
            path: path.to_path_buf(),
            diagnostics: format!("exit code {:?}: {}", output.status.code(), diagnostics),
        }
        .into());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn split_source_path(path: &Path) -> Result<(Option<PathBuf>, &std::ffi::OsStr)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("not a source file: {}", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf);
    Ok((dir, file_name))
}

#[derive(Debug, Deserialize)]
struct SolcOutput {
    contracts: BTreeMap<String, SolcContract>,
}

#[derive(Debug, Deserialize)]
struct SolcContract {
    #[serde(default)]
    abi: Value,
    #[serde(default)]
    bin: String,
    #[serde(rename = "bin-runtime", default)]
    bin_runtime: String,
    /// signature -> selector
    #[serde(default)]
    hashes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct VyperContract {
    #[serde(default)]
    abi: Value,
    #[serde(default)]
    bytecode: String,
    #[serde(default)]
    bytecode_runtime: String,
    /// signature -> `0x`-prefixed selector
    #[serde(default)]
    method_identifiers: BTreeMap<String, String>,
}

/// Parses `solc --combined-json` output; names are kept as `file:Contract`
pub fn parse_solc_output(output: &str, path: &Path, version: &str) -> Result<ContractMap> {
    let parsed: SolcOutput = serde_json::from_str(output)
        .map_err(|e| unreadable_output(Dialect::Solidity, path, e))?;

    let mut contracts = ContractMap::new();
    for (name, contract) in parsed.contracts {
        let abi = normalize_abi(contract.abi)
            .map_err(|e| unreadable_output(Dialect::Solidity, path, e))?;
        contracts.insert(
            name.clone(),
            CompiledContract {
                name,
                abi,
                bytecode: with_hex_prefix(&contract.bin),
                runtime_bytecode: with_hex_prefix(&contract.bin_runtime),
                signatures: invert_signatures(contract.hashes),
                compiler_version: version.to_string(),
            },
        );
    }
    Ok(contracts)
}

/// Parses `vyper -f combined_json` output and qualifies the names
pub fn parse_vyper_output(output: &str, path: &Path, version: &str) -> Result<ContractMap> {
    let parsed: serde_json::Map<String, Value> = serde_json::from_str(output)
        .map_err(|e| unreadable_output(Dialect::Vyper, path, e))?;

    let mut contracts = ContractMap::new();
    // Non-object entries such as "version" are metadata
    for (key, entry) in parsed.into_iter().filter(|(_, v)| v.is_object()) {
        let contract: VyperContract = serde_json::from_value(entry)
            .map_err(|e| unreadable_output(Dialect::Vyper, path, e))?;
        let abi = normalize_abi(contract.abi)
            .map_err(|e| unreadable_output(Dialect::Vyper, path, e))?;
        let name = qualify_vyper_name(&key);

        contracts.insert(
            name.clone(),
            CompiledContract {
                name,
                abi,
                bytecode: with_hex_prefix(&contract.bytecode),
                runtime_bytecode: with_hex_prefix(&contract.bytecode_runtime),
                signatures: invert_signatures(contract.method_identifiers),
                compiler_version: version.to_string(),
            },
        );
    }
    Ok(contracts)
}

/// Vyper keys its output by file path; turn `path/to/curve_pool.vy` into
/// `CurvePool`. Names that are already qualified are kept.
///
/// Only the first letter of each `_` separated part is raised, so acronyms
/// survive: `USDC_pool.vy` is `USDCPool`.
pub fn qualify_vyper_name(name: &str) -> String {
    if name.contains(':') {
        return name.to_string();
    }
    let file_name = Path::new(name)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or(name);
    file_name
        .strip_suffix(".vy")
        .unwrap_or(file_name)
        .split('_')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect()
}

/// Older solc releases emit the ABI as a JSON string
fn normalize_abi(abi: Value) -> serde_json::Result<Value> {
    match abi {
        Value::String(encoded) => serde_json::from_str(&encoded),
        Value::Null => Ok(Value::Array(Vec::new())),
        other => Ok(other),
    }
}

fn invert_signatures(hashes: BTreeMap<String, String>) -> BTreeMap<String, String> {
    hashes
        .into_iter()
        .map(|(signature, selector)| (strip_hex_prefix(&selector).to_lowercase(), signature))
        .collect()
}

fn unreadable_output(dialect: Dialect, path: &Path, err: serde_json::Error) -> Error {
    Error::Compile {
        dialect,
        path: path.to_path_buf(),
        diagnostics: format!("unreadable compiler output: {err}"),
    }
}
