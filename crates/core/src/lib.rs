//! Contract source fetching, compilation and artifact export for Solidity and
//! Vyper
pub mod artifacts;
pub mod compiler;
pub mod config;
mod error;
pub mod explorer;
mod http;
pub mod imports;
pub mod pipeline;
pub mod resolver;
pub mod source;
mod utils;

pub use artifacts::{collect, library_placeholder, ArtifactSet, BindingGenerator, RustBindingGenerator};
pub use compiler::{CompiledContract, Compiler, ContractMap};
pub use config::{ContragetConfig, ContragetConfigBuilder, ExplorerConfig};
pub use error::Error;
pub use explorer::{ContractSource, EtherscanClient, Network, SourceFetcher};
pub use http::HttpClient;
pub use pipeline::{Pipeline, RunSummary};
pub use resolver::{BinaryFetcher, CompilerCache, CompilerResolver, Dialect};
pub use source::{normalize, ContractFileSet, RawSourcePayload};
