//! Source generation for typed contract packages

use super::ArtifactSet;
use crate::error::Error;
use convert_case::{Case, Casing};
use eyre::Result;
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Write,
};

/// Turns an [`ArtifactSet`] into the source of one package file
pub trait BindingGenerator {
    /// File extension of the generated source, without the dot
    fn extension(&self) -> &str;

    /// `aliases` maps a method signature, method name or contract type to the
    /// name to use instead
    fn generate(
        &self,
        artifacts: &ArtifactSet,
        package: &str,
        aliases: &BTreeMap<String, String>,
    ) -> Result<String>;
}

/// Emits a Rust module per contract with its ABI, bytecode and selectors
#[derive(Debug, Clone, Copy, Default)]
pub struct RustBindingGenerator;

/// Constants every contract module defines
const RESERVED: &[&str] = &["NAME", "ABI", "BYTECODE", "SIGNATURES"];

impl BindingGenerator for RustBindingGenerator {
    fn extension(&self) -> &str {
        "rs"
    }

    fn generate(
        &self,
        artifacts: &ArtifactSet,
        package: &str,
        aliases: &BTreeMap<String, String>,
    ) -> Result<String> {
        if artifacts.is_empty() {
            return Err(Error::EmptyArtifact(format!("no contracts for package {package}")).into());
        }

        let mut out = String::new();
        writeln!(out, "//! Contract bindings for `{package}`")?;
        writeln!(out, "//!")?;
        writeln!(out, "//! Generated by contraget, do not edit.")?;
        writeln!(out)?;

        let mut libs: Vec<_> = artifacts.libs.iter().collect();
        libs.sort();
        writeln!(out, "/// Bytecode placeholder to library name")?;
        writeln!(out, "pub const LIBRARY_PLACEHOLDERS: &[(&str, &str)] = &[")?;
        for (placeholder, name) in libs {
            writeln!(out, "    ({placeholder:?}, {name:?}),")?;
        }
        writeln!(out, "];")?;

        let mut modules: HashMap<String, &str> = HashMap::new();
        for (i, ty) in artifacts.types.iter().enumerate() {
            let module = module_name(ty, aliases)?;
            if let Some(previous) = modules.insert(module.clone(), ty) {
                return Err(Error::Generation(format!(
                    "contracts {previous} and {ty} both map to module `{module}`, add an alias"
                ))
                .into());
            }

            writeln!(out)?;
            write_contract(&mut out, ty, &module, artifacts, i, aliases)?;
        }

        syn::parse_file(&out)
            .map_err(|e| Error::Generation(format!("generated bindings do not parse: {e}")))?;

        Ok(out)
    }
}

fn write_contract(
    out: &mut String,
    ty: &str,
    module: &str,
    artifacts: &ArtifactSet,
    index: usize,
    aliases: &BTreeMap<String, String>,
) -> Result<()> {
    let abi = &artifacts.abis[index];
    let hashes = "#".repeat(longest_hash_run(abi) + 1);

    writeln!(out, "pub mod {module} {{")?;
    writeln!(out, "    pub const NAME: &str = {ty:?};")?;
    writeln!(out, "    pub const ABI: &str = r{hashes}\"{abi}\"{hashes};")?;
    writeln!(out, "    pub const BYTECODE: &str = {:?};", artifacts.bins[index])?;

    let sigs = &artifacts.sigs[index];
    writeln!(out, "    pub const SIGNATURES: &[(&str, &str)] = &[")?;
    for (selector, signature) in sigs {
        writeln!(out, "        ({selector:?}, {signature:?}),")?;
    }
    writeln!(out, "    ];")?;

    let mut constants: HashMap<String, &str> = HashMap::new();
    for (selector, signature) in sigs {
        let constant = method_constant(signature, aliases);
        if RESERVED.contains(&constant.as_str()) {
            return Err(Error::Generation(format!(
                "{ty}: method {signature} clashes with the `{constant}` constant, add an alias"
            ))
            .into());
        }
        if let Some(previous) = constants.insert(constant.clone(), signature) {
            return Err(Error::Generation(format!(
                "{ty}: methods {previous} and {signature} both map to `{constant}`, add an alias"
            ))
            .into());
        }

        let bytes = selector_bytes(selector)
            .ok_or_else(|| Error::Generation(format!("{ty}: invalid selector {selector:?}")))?;
        writeln!(out, "    /// `{signature}`")?;
        writeln!(
            out,
            "    pub const {constant}: [u8; 4] = [{}];",
            bytes
                .iter()
                .map(|b| format!("0x{b:02x}"))
                .collect::<Vec<_>>()
                .join(", ")
        )?;
    }

    writeln!(out, "}}")?;
    Ok(())
}

fn module_name(ty: &str, aliases: &BTreeMap<String, String>) -> Result<String> {
    let name = aliases.get(ty).map(String::as_str).unwrap_or(ty).to_case(Case::Snake);
    if syn::parse_str::<syn::Ident>(&name).is_err() {
        return Err(Error::Generation(format!(
            "contract {ty} gives `{name}`, which is not a valid module name, add an alias"
        ))
        .into());
    }
    Ok(name)
}

/// Alias lookup by full signature first, then by method name
fn method_constant(signature: &str, aliases: &BTreeMap<String, String>) -> String {
    let method = signature.split('(').next().unwrap_or(signature);
    aliases
        .get(signature)
        .or_else(|| aliases.get(method))
        .map(String::as_str)
        .unwrap_or(method)
        .to_case(Case::UpperSnake)
}

fn selector_bytes(selector: &str) -> Option<[u8; 4]> {
    hex::decode(selector).ok()?.try_into().ok()
}

fn longest_hash_run(s: &str) -> usize {
    s.split(|c: char| c != '#').map(str::len).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifacts() -> ArtifactSet {
        ArtifactSet {
            types: vec!["SafeMath".into(), "Token".into()],
            abis: vec![
                "[]".into(),
                r##"[{"name":"transfer","type":"function","note":"\"#"}]"##.into(),
            ],
            bins: vec!["0x6056".into(), "0x6080".into()],
            sigs: vec![
                BTreeMap::new(),
                BTreeMap::from([
                    ("a9059cbb".to_string(), "transfer(address,uint256)".to_string()),
                    ("70a08231".to_string(), "balanceOf(address)".to_string()),
                ]),
            ],
            libs: HashMap::from([(
                crate::artifacts::library_placeholder("Token.sol:SafeMath"),
                "SafeMath".to_string(),
            )]),
        }
    }

    #[test]
    fn test_generate_rust_bindings() {
        let source = RustBindingGenerator
            .generate(&artifacts(), "Token", &BTreeMap::new())
            .unwrap();

        assert!(source.contains("pub mod safe_math {"));
        assert!(source.contains("pub mod token {"));
        assert!(source.contains("pub const TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];"));
        assert!(source.contains("pub const BALANCE_OF: [u8; 4] = [0x70, 0xa0, 0x82, 0x31];"));
        assert!(source.contains("pub const BYTECODE: &str = \"0x6080\";"));
        assert!(source.contains(&format!(
            "(\"{}\", \"SafeMath\")",
            crate::artifacts::library_placeholder("Token.sol:SafeMath")
        )));
        // the ABI contains `"#`, so the raw string needs two hashes
        assert!(source.contains("pub const ABI: &str = r##\"[{"));
    }

    #[test]
    fn test_overloads_need_aliases() {
        let mut set = artifacts();
        set.sigs[1].insert("beabacc8".into(), "transfer(address,address,uint256)".into());

        let err = RustBindingGenerator
            .generate(&set, "Token", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Generation(_))));

        let aliases = BTreeMap::from([(
            "transfer(address,address,uint256)".to_string(),
            "transferFrom".to_string(),
        )]);
        let source = RustBindingGenerator.generate(&set, "Token", &aliases).unwrap();
        assert!(source.contains("pub const TRANSFER_FROM: [u8; 4] = [0xbe, 0xab, 0xac, 0xc8];"));
    }

    #[test]
    fn test_duplicate_types_rejected() {
        let mut set = artifacts();
        set.types[0] = "Token".into();

        let err = RustBindingGenerator
            .generate(&set, "Token", &BTreeMap::new())
            .unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::Generation(msg)) => assert!(msg.contains("`token`")),
            other => panic!("unexpected error: {other:?}"),
        }

        let aliases = BTreeMap::from([("Token".to_string(), "Erc20".to_string())]);
        // both entries are aliased, so they still collide
        assert!(RustBindingGenerator.generate(&set, "Token", &aliases).is_err());
    }

    #[test]
    fn test_type_alias() {
        let aliases = BTreeMap::from([("SafeMath".to_string(), "MathLib".to_string())]);
        let source = RustBindingGenerator
            .generate(&artifacts(), "Token", &aliases)
            .unwrap();
        assert!(source.contains("pub mod math_lib {"));
        assert!(source.contains("pub const NAME: &str = \"SafeMath\";"));
    }

    #[test]
    fn test_keyword_module_name() {
        let mut set = artifacts();
        set.types[0] = "Type".into();

        let err = RustBindingGenerator
            .generate(&set, "Pkg", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Generation(_))));
    }

    #[test]
    fn test_empty_artifacts() {
        let err = RustBindingGenerator
            .generate(&ArtifactSet::default(), "Pkg", &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::EmptyArtifact(_))));
    }

    #[test]
    fn test_longest_hash_run() {
        assert_eq!(longest_hash_run("abc"), 0);
        assert_eq!(longest_hash_run("a#b###c##"), 3);
    }
}
