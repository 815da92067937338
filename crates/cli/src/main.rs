//! CLI for the contraget library
//!
//! Fetches verified contracts (or reads local ones), compiles them and exports
//! ABI, bytecode and generated bindings.

use clap::Parser;
use contraget::{ContragetConfig, ContragetConfigBuilder, Error, Network, Pipeline, RunSummary};
use eyre::{Result, WrapErr};
use serde::Serialize;
use std::path::PathBuf;
use tracing::Level;

/// Solidity and Vyper contract fetcher and compiler
#[derive(Parser, Debug)]
#[command(name = "contraget")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Contract address, local .sol/.vy file or directory
    #[arg(long)]
    path: Option<String>,

    /// Contract name used for output files
    #[arg(long)]
    name: Option<String>,

    /// Compiler version to use instead of the detected one
    #[arg(long)]
    compiler_version: Option<String>,

    /// Network the contract is deployed on (mainnet, rinkeby, goerli)
    #[arg(long)]
    network: Option<Network>,

    /// Folder for downloaded sources
    #[arg(long)]
    download_dst: Option<PathBuf>,

    /// Folder for the merged ABI and bytecode files
    #[arg(long)]
    objects_dst: Option<PathBuf>,

    /// Folder for the generated package
    #[arg(long)]
    pkg_dst: Option<PathBuf>,

    /// Binding name overrides, `from=to` pairs separated by commas
    #[arg(long)]
    pkg_aliases: Vec<String>,

    /// Extra compiler arguments separated by `;`
    #[arg(long, value_delimiter = ';', allow_hyphen_values = true)]
    compiler_args: Vec<String>,

    /// Compiler binary cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Block explorer API key
    #[arg(long, env = "ETHERSCAN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// TOML configuration file; flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output JSON to stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all logging except errors
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status")]
enum Output {
    #[serde(rename = "success")]
    Success {
        #[serde(flatten)]
        summary: RunSummary,
    },

    #[serde(rename = "error")]
    Error { error_type: String, message: String },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let json = cli.json;
    let result = build_config(cli)
        .and_then(|config| Pipeline::from_config(config)?.run().wrap_err("contraget failed"));

    match result {
        Ok(summary) => {
            if let Err(e) = output_summary(summary, json) {
                output_error(e, json);
                std::process::exit(1);
            }
        }
        Err(e) => {
            output_error(e, json);
            std::process::exit(1);
        }
    }
}

/// Merges the optional config file with command-line flags
fn build_config(cli: Cli) -> Result<ContragetConfig> {
    let base = match &cli.config {
        Some(path) => ContragetConfig::from_toml_file(path).wrap_err("load config file")?,
        None => ContragetConfig::default(),
    };
    let mut builder = ContragetConfigBuilder::from_config(base);

    if let Some(path) = cli.path {
        builder = builder.path(path);
    }
    if let Some(name) = cli.name {
        builder = builder.name(name);
    }
    if let Some(version) = cli.compiler_version {
        builder = builder.compiler_version(version);
    }
    if let Some(network) = cli.network {
        builder = builder.network(network);
    }
    if let Some(dst) = cli.download_dst {
        builder = builder.download_dst(dst);
    }
    if let Some(dst) = cli.objects_dst {
        builder = builder.objects_dst(dst);
    }
    if let Some(dst) = cli.pkg_dst {
        builder = builder.pkg_dst(dst);
    }
    for raw in &cli.pkg_aliases {
        for (from, to) in parse_aliases(raw)? {
            builder = builder.pkg_alias(from, to);
        }
    }
    if !cli.compiler_args.is_empty() {
        builder = builder.compiler_args(cli.compiler_args);
    }
    if let Some(dir) = cli.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(key) = cli.api_key {
        builder = builder.api_key(key);
    }

    builder.build()
}

/// Parses `from=to` pairs separated by commas; commas inside parentheses
/// belong to a method signature
fn parse_aliases(raw: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    let mut push = |item: &str| -> Result<()> {
        let item = item.trim();
        if item.is_empty() {
            return Ok(());
        }
        let (from, to) = item
            .rsplit_once('=')
            .ok_or_else(|| Error::Config(format!("package alias is not `from=to`: {item}")))?;
        pairs.push((from.trim().to_string(), to.trim().to_string()));
        Ok(())
    };

    for (i, c) in raw.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                push(&raw[start..i])?;
                start = i + 1;
            }
            _ => {}
        }
    }
    push(&raw[start..])?;

    Ok(pairs)
}

fn output_summary(summary: RunSummary, json: bool) -> Result<()> {
    if json {
        let output = Output::Success { summary };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!(
        "✅ Successfully processed {} ({} file(s))",
        summary.name, summary.files
    );
    println!("📄 Contracts: {}", summary.contracts.join(", "));
    if let Some(path) = &summary.abi_path {
        println!("   - ABI: {}", path.display());
    }
    for path in &summary.bin_paths {
        println!("   - bytecode: {}", path.display());
    }
    if let Some(path) = &summary.package_path {
        println!("📦 Package: {}", path.display());
    }
    Ok(())
}

fn output_error(error: eyre::Report, json: bool) {
    let error_type = error
        .downcast_ref::<Error>()
        .map(Error::kind)
        .unwrap_or("unknown_error");

    if !json {
        eprintln!("❌ Error: {error:?}");
        return;
    }

    let output = Output::Error {
        error_type: error_type.to_string(),
        message: format!("{error:#}"),
    };
    match serde_json::to_string(&output) {
        Ok(line) => eprintln!("{line}"),
        Err(_) => eprintln!("{error:#}"),
    }
}
