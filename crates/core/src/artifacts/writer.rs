//! Exporters writing collected artifacts to disk
//!
//! ```ignore
//! <objects_dst>/
//!   <Name>.json        merged ABI
//!   <Type>.bin         bytecode per contract
//! <pkg_dst>/
//!   <Name>/
//!     <Name>.<ext>     generated bindings
//! ```

use super::{abi::merge_abis, bindings::BindingGenerator, ArtifactSet};
use crate::{error::Error, utils::recreate_dir};
use eyre::{Result, WrapErr};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use tracing::info;

/// Writes the merged ABI of all contracts as `<folder>/<name>.json`
pub fn export_abi<S: AsRef<str>>(folder: &Path, name: &str, abis: &[S]) -> Result<PathBuf> {
    let merged = merge_abis(abis).wrap_err_with(|| format!("merge ABIs of {name}"))?;

    std::fs::create_dir_all(folder).map_err(|e| Error::io(folder, e))?;
    let path = folder.join(format!("{name}.json"));
    std::fs::write(&path, merged).map_err(|e| Error::io(&path, e))?;

    info!("Saved ABI to: {}", path.display());
    Ok(path)
}

/// Writes each contract's bytecode as `<folder>/<type>.bin`
///
/// A type defined more than once keeps the bytecode written last.
pub fn export_bin<S: AsRef<str>>(folder: &Path, types: &[String], bins: &[S]) -> Result<Vec<PathBuf>> {
    if types.len() != bins.len() {
        return Err(Error::Config(format!(
            "{} contract types but {} bytecodes",
            types.len(),
            bins.len()
        ))
        .into());
    }

    std::fs::create_dir_all(folder).map_err(|e| Error::io(folder, e))?;

    let mut written = Vec::with_capacity(types.len());
    for (ty, bin) in types.iter().zip(bins) {
        let path = folder.join(format!("{ty}.bin"));
        std::fs::write(&path, bin.as_ref()).map_err(|e| Error::io(&path, e))?;
        written.push(path);
    }

    info!("Saved {} bytecode file(s) to: {}", written.len(), folder.display());
    Ok(written)
}

/// Generates bindings and writes them to a fresh `<folder>/<name>/` directory
pub fn export_package(
    folder: &Path,
    name: &str,
    artifacts: &ArtifactSet,
    aliases: &BTreeMap<String, String>,
    generator: &dyn BindingGenerator,
) -> Result<PathBuf> {
    let source = generator
        .generate(artifacts, name, aliases)
        .wrap_err_with(|| format!("generate package {name}"))?;

    let package_dir = folder.join(name);
    recreate_dir(&package_dir)
        .wrap_err_with(|| format!("create package folder: {}", package_dir.display()))?;

    let path = package_dir.join(format!("{name}.{}", generator.extension()));
    std::fs::write(&path, source).map_err(|e| Error::io(&path, e))?;

    info!("Saved package to: {}", path.display());
    Ok(path)
}
