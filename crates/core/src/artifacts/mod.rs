//! Artifact collection for compiled contracts

use crate::compiler::{bare_name, ContractMap};
use eyre::Result;
use sha3::{Digest, Keccak256};
use std::collections::{BTreeMap, HashMap};

pub mod abi;
pub mod bindings;
pub mod writer;

pub use abi::merge_abis;
pub use bindings::{BindingGenerator, RustBindingGenerator};
pub use writer::{export_abi, export_bin, export_package};

/// Hex characters of a library placeholder
pub const PLACEHOLDER_LEN: usize = 34;

/// Aligned per-contract collections handed to the exporters
///
/// Index `i` of `types`, `abis`, `bins` and `sigs` describes the same
/// contract. A bare name defined in several files appears once per file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactSet {
    pub types: Vec<String>,
    /// ABI of each contract as a JSON array string
    pub abis: Vec<String>,
    pub bins: Vec<String>,
    /// selector -> signature
    pub sigs: Vec<BTreeMap<String, String>>,
    /// placeholder -> bare contract name
    pub libs: HashMap<String, String>,
}

impl ArtifactSet {
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Flattens compiled contracts into an [`ArtifactSet`], ordered by qualified
/// name
pub fn collect(contracts: &ContractMap) -> Result<ArtifactSet> {
    let mut set = ArtifactSet::default();

    for (qualified, contract) in contracts {
        let name = bare_name(qualified).to_string();
        if set.types.contains(&name) {
            tracing::warn!("Contract type {} is defined in more than one file", name);
        }

        set.abis.push(serde_json::to_string(&contract.abi)?);
        set.bins.push(contract.bytecode.clone());
        set.sigs.push(contract.signatures.clone());
        set.libs.insert(library_placeholder(qualified), name.clone());
        set.types.push(name);
    }

    tracing::debug!("Collected artifacts for {} contract(s)", set.len());
    Ok(set)
}

/// First 34 hex characters of `keccak256(qualified_name)`, the token solc
/// leaves in bytecode that links against the library
pub fn library_placeholder(qualified_name: &str) -> String {
    let hash = Keccak256::digest(qualified_name.as_bytes());
    let mut placeholder = hex::encode(hash);
    placeholder.truncate(PLACEHOLDER_LEN);
    placeholder
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compiler::CompiledContract;
    use serde_json::json;

    pub(crate) fn contract(name: &str, abi: serde_json::Value, bytecode: &str) -> CompiledContract {
        CompiledContract {
            name: name.to_string(),
            abi,
            bytecode: bytecode.to_string(),
            runtime_bytecode: bytecode.to_string(),
            signatures: BTreeMap::new(),
            compiler_version: "v0.8.10".to_string(),
        }
    }

    #[test]
    fn test_library_placeholder() {
        let placeholder = library_placeholder("Token.sol:SafeMath");
        assert_eq!(placeholder.len(), PLACEHOLDER_LEN);
        assert!(placeholder.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(placeholder, library_placeholder("Token.sol:SafeMath"));
        assert_ne!(placeholder, library_placeholder("Math.sol:SafeMath"));

        // keccak256("") = c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470
        assert_eq!(library_placeholder(""), "c5d2460186f7233c927e7db2dcc703c0e5");
    }

    #[test]
    fn test_collect_keeps_duplicate_bare_names() {
        let mut contracts = ContractMap::new();
        contracts.insert("a/Token.sol:Token".into(), contract("a/Token.sol:Token", json!([]), "0x01"));
        contracts.insert("b/Token.sol:Token".into(), contract("b/Token.sol:Token", json!([]), "0x02"));
        contracts.insert("Math.sol:SafeMath".into(), contract("Math.sol:SafeMath", json!([]), "0x03"));

        let set = collect(&contracts).unwrap();

        assert_eq!(set.types, ["SafeMath", "Token", "Token"]);
        assert_eq!(set.bins, ["0x03", "0x01", "0x02"]);
        assert_eq!(set.abis.len(), 3);
        assert_eq!(set.sigs.len(), 3);
        assert_eq!(set.libs.len(), 3);
        assert!(set
            .libs
            .iter()
            .all(|(placeholder, _)| placeholder.len() == PLACEHOLDER_LEN));
        assert_eq!(set.libs[&library_placeholder("Math.sol:SafeMath")], "SafeMath");
    }

    #[test]
    fn test_collect_serializes_abi() {
        let mut contracts = ContractMap::new();
        contracts.insert(
            "Vault".into(),
            contract("Vault", json!([{"type": "fallback"}]), "0x60"),
        );

        let set = collect(&contracts).unwrap();
        assert_eq!(set.abis, [r#"[{"type":"fallback"}]"#]);
        assert_eq!(set.types, ["Vault"]);
    }

    #[test]
    fn test_collect_empty() {
        let set = collect(&ContractMap::new()).unwrap();
        assert!(set.is_empty());
        assert!(set.libs.is_empty());
    }
}
