//! Error taxonomy shared by every pipeline stage
//!
//! Stage functions return `eyre::Result`; the values below sit at the root of
//! the report chain so callers can recover the category with
//! `report.downcast_ref::<Error>()`.

use std::path::{Path, PathBuf};

use crate::resolver::Dialect;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unrecognized source payload: {0}")]
    Decode(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported target: {0}")]
    UnsupportedTarget(String),

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("explorer returned an error: {0}")]
    Explorer(String),

    #[error("{dialect} compilation of {} failed: {diagnostics}", path.display())]
    Compile {
        dialect: Dialect,
        path: PathBuf,
        diagnostics: String,
    },

    #[error("binding generation failed: {0}")]
    Generation(String),

    #[error("no usable artifacts: {0}")]
    EmptyArtifact(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{} errors occurred: {}", .0.len(), join_messages(.0))]
    Multiple(Vec<Error>),
}

impl Error {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Collapses a list of failures from one scoped operation.
    ///
    /// Returns `None` when nothing failed and the single error unchanged when
    /// only one did.
    pub fn aggregate(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multiple(errors)),
        }
    }

    /// Short machine-readable category, used by the CLI JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Decode(_) => "decode_error",
            Error::Io { .. } => "io_error",
            Error::UnsupportedTarget(_) => "unsupported_target",
            Error::Download { .. } => "download_error",
            Error::Explorer(_) => "explorer_error",
            Error::Compile { .. } => "compile_error",
            Error::Generation(_) => "generation_error",
            Error::EmptyArtifact(_) => "empty_artifact",
            Error::Config(_) => "config_error",
            Error::Multiple(_) => "multiple_errors",
        }
    }
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyre::WrapErr;

    #[test]
    fn test_aggregate() {
        assert!(Error::aggregate(vec![]).is_none());

        let single = Error::aggregate(vec![Error::Decode("x".into())]).unwrap();
        assert!(matches!(single, Error::Decode(_)));

        let both = Error::aggregate(vec![
            Error::io("a.sol", std::io::Error::other("write")),
            Error::io("a.sol", std::io::Error::other("flush")),
        ])
        .unwrap();
        let message = both.to_string();
        assert!(message.starts_with("2 errors occurred"));
        assert!(message.contains("write"));
        assert!(message.contains("flush"));
    }

    #[test]
    fn test_downcast_through_context() {
        let result: eyre::Result<()> = Err(Error::EmptyArtifact("no abi".into()).into());
        let report = result.wrap_err("export ABI").unwrap_err();

        assert_eq!(report.to_string(), "export ABI");
        let root = report.downcast_ref::<Error>().unwrap();
        assert_eq!(root.kind(), "empty_artifact");
    }
}
