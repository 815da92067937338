//! Source normalization: explorer payloads and local paths to a file set
//!
//! The explorer returns multi-file projects in more than one layout, so the
//! payload is decoded by trying each known layout in order and keeping the
//! first that fits.

use crate::{
    error::Error,
    explorer::ContractSource,
    imports,
    resolver::Dialect,
    utils::{capitalize, recreate_dir, with_v_prefix},
};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    collections::BTreeMap,
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// One file of a multi-file payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceFile {
    #[serde(alias = "Content")]
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct StandardJsonInput {
    #[serde(alias = "Sources")]
    sources: BTreeMap<String, SourceFile>,
}

/// Decoded shape of an explorer `SourceCode` field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSourcePayload {
    /// `{"path/A.sol": {"content": "..."}, ...}`
    FileMap(BTreeMap<String, SourceFile>),
    /// `{{"language": "...", "sources": {...}, "settings": {...}}}`, outer
    /// braces doubled or not
    StandardJson(BTreeMap<String, SourceFile>),
    /// Plain source text of a single-file contract
    Single(String),
}

type Decoder = fn(&str) -> Option<RawSourcePayload>;

const DECODERS: &[(&str, Decoder)] = &[
    ("file map", decode_file_map),
    ("standard JSON", decode_standard_json),
    ("single source", decode_single),
];

impl RawSourcePayload {
    pub fn decode(source: &str) -> Result<Self> {
        for (layout, decoder) in DECODERS {
            if let Some(payload) = decoder(source) {
                tracing::debug!("Decoded source payload as {}", layout);
                return Ok(payload);
            }
        }
        Err(Error::Decode("payload matches none of the known layouts".to_string()).into())
    }

    pub fn file_count(&self) -> usize {
        match self {
            RawSourcePayload::FileMap(files) | RawSourcePayload::StandardJson(files) => files.len(),
            RawSourcePayload::Single(_) => 1,
        }
    }
}

fn decode_file_map(source: &str) -> Option<RawSourcePayload> {
    serde_json::from_str::<BTreeMap<String, SourceFile>>(source)
        .ok()
        .filter(|files| !files.is_empty())
        .map(RawSourcePayload::FileMap)
}

fn decode_standard_json(source: &str) -> Option<RawSourcePayload> {
    let trimmed = source.trim();
    let unwrapped = trimmed
        .strip_prefix("{{")
        .and_then(|s| s.strip_suffix("}}"))
        .map(|inner| format!("{{{inner}}}"));
    let candidate = unwrapped.as_deref().unwrap_or(trimmed);

    serde_json::from_str::<StandardJsonInput>(candidate)
        .ok()
        .filter(|input| !input.sources.is_empty())
        .map(|input| RawSourcePayload::StandardJson(input.sources))
}

fn decode_single(source: &str) -> Option<RawSourcePayload> {
    (!source.trim().is_empty()).then(|| RawSourcePayload::Single(source.to_string()))
}

/// Source files to compile, each mapped to its `v`-prefixed compiler version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContractFileSet(BTreeMap<PathBuf, String>);

impl ContractFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, version: impl AsRef<str>) {
        self.0.insert(path.into(), with_v_prefix(version.as_ref()));
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.0.iter().map(|(p, v)| (p.as_path(), v.as_str()))
    }

    /// Builds a file set from a local `.sol`/`.vy` file or a directory of them
    ///
    /// Without `version`, each file's version is read from its pragma.
    pub fn from_local(path: &Path, version: Option<&str>) -> Result<Self> {
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("sol" | "vy")))
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        if files.is_empty() {
            return Err(Error::Config(format!(
                "no .sol or .vy files found under {}",
                path.display()
            ))
            .into());
        }

        let mut set = Self::new();
        for file in files {
            let version = match version {
                Some(v) => with_v_prefix(v),
                None => {
                    let inferred = infer_compiler_version(&file)
                        .wrap_err("get contracts compiler version")?;
                    tracing::info!(
                        "Compiler version not specified so inferred from {}: {}",
                        file.display(),
                        inferred
                    );
                    inferred
                }
            };
            set.insert(file, version);
        }
        Ok(set)
    }
}

impl<'a> IntoIterator for &'a ContractFileSet {
    type Item = (&'a PathBuf, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, PathBuf, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Writes an explorer payload to `<download_dst>/<Name>/` and returns the
/// resulting file set
///
/// An existing folder for the same name is deleted first. Multi-file projects
/// are flattened into that one folder with imports rewritten to match.
pub fn normalize(
    record: &ContractSource,
    download_dst: &Path,
    name: &str,
) -> Result<ContractFileSet> {
    let version = compiler_version_from_metadata(&record.compiler_version)?;
    let payload = RawSourcePayload::decode(&record.source_code)?;

    let name = capitalize(name);
    let folder = download_dst.join(&name);
    recreate_dir(&folder).wrap_err_with(|| format!("create download folder: {}", folder.display()))?;
    let mut files = ContractFileSet::new();

    match payload {
        RawSourcePayload::FileMap(sources) | RawSourcePayload::StandardJson(sources) => {
            for (original, source) in &sources {
                let file_name = Path::new(original)
                    .file_name()
                    .ok_or_else(|| Error::Decode(format!("source path has no file name: {original}")))?;
                let path = folder.join(file_name);
                if files.get(&path).is_some() {
                    tracing::warn!(
                        "{} flattens onto an already written file, overwriting it",
                        original
                    );
                }
                write_source_file(&path, &source.content, Dialect::from_path(&path))?;
                files.insert(path, &version);
            }
        }
        RawSourcePayload::Single(source) => {
            let dialect = if record.compiler_version.contains("vyper") {
                Dialect::Vyper
            } else {
                Dialect::Solidity
            };
            let path = folder.join(format!("{}.{}", name, dialect.extension()));
            write_source_file(&path, &source, dialect)?;
            files.insert(path, &version);
        }
    }

    tracing::info!("Wrote {} source file(s) to {}", files.len(), folder.display());
    Ok(files)
}

/// Derives the compiler version from explorer metadata
///
/// `vyper:0.2.4` gives `v0.2.4`, `v0.8.10+commit.fc410830` gives `v0.8.10`.
pub fn compiler_version_from_metadata(metadata: &str) -> Result<String> {
    let metadata = metadata.trim();
    let version = if metadata.contains("vyper") {
        metadata.split_once(':').map(|(_, v)| v).unwrap_or_default()
    } else {
        metadata.split('+').next().unwrap_or_default()
    };
    let version = version.trim();

    if version.is_empty() {
        return Err(Error::Decode(format!("unrecognized compiler version: {metadata:?}")).into());
    }
    Ok(with_v_prefix(version))
}

/// Reads the compiler version from a file's version pragma
pub fn infer_compiler_version(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let is_pragma: fn(&str) -> bool = match Dialect::from_path(path) {
        Dialect::Solidity => |line| line.starts_with("pragma solidity"),
        Dialect::Vyper => |line| {
            line.starts_with('#') && (line.contains("@version") || line.contains("pragma version"))
        },
    };

    content
        .lines()
        .map(str::trim)
        .filter(|line| is_pragma(line))
        .find_map(first_semver)
        .map(|v| with_v_prefix(&v))
        .ok_or_else(|| {
            Error::Config(format!("no compiler version pragma in {}", path.display())).into()
        })
}

/// First `x.y.z` token of a line
fn first_semver(line: &str) -> Option<String> {
    line.split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find(|token| {
            let parts: Vec<&str> = token.split('.').collect();
            parts.len() == 3 && parts.iter().all(|p| !p.is_empty())
        })
        .map(str::to_string)
}

/// Writes `content`, flattening imports of Solidity sources
///
/// Write, flush and sync failures are all reported instead of the last one
/// masking the first.
pub fn write_source_file(path: &Path, content: &str, dialect: Dialect) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    let mut errors = Vec::new();

    let content = match dialect {
        Dialect::Solidity => Cow::Owned(imports::rewrite_imports(content)),
        Dialect::Vyper => Cow::Borrowed(content),
    };
    if let Err(e) = writer.write_all(content.as_bytes()) {
        errors.push(Error::io(path, e));
    }

    match writer.into_inner() {
        Ok(file) => {
            if let Err(e) = file.sync_all() {
                errors.push(Error::io(path, e));
            }
        }
        Err(e) => errors.push(Error::io(path, e.into_error())),
    }

    match Error::aggregate(errors) {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
