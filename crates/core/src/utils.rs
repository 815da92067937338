//! Small helpers shared across the pipeline

use crate::error::Error;
use eyre::Result;
use std::path::Path;

/// Removes `path` if present and creates it again, empty.
pub fn recreate_dir(path: &Path) -> Result<()> {
    if path.exists() {
        tracing::debug!("Removing existing directory: {}", path.display());
        std::fs::remove_dir_all(path).map_err(|e| Error::io(path, e))?;
    }
    std::fs::create_dir_all(path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

/// Uppercases the first character, leaving the rest untouched.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Prefixes a version string with `v` unless it already has one.
pub fn with_v_prefix(version: &str) -> String {
    let version = version.trim();
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{version}")
    }
}

/// Returns `hex` with exactly one `0x` prefix.
pub fn with_hex_prefix(hex: &str) -> String {
    format!("0x{}", strip_hex_prefix(hex))
}

pub fn strip_hex_prefix(hex: &str) -> &str {
    hex.strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex)
}
