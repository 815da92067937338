use crate::error::Error;
use eyre::Result;

/// Merges per-contract ABI arrays into one JSON array
///
/// Each ABI's outer brackets are removed and the bodies joined with commas.
/// ABIs of two characters or fewer (`[]`) are skipped; if nothing remains the
/// merge fails with [`Error::EmptyArtifact`].
pub fn merge_abis<S: AsRef<str>>(abis: &[S]) -> Result<String> {
    let bodies: Vec<&str> = abis
        .iter()
        .map(|abi| abi.as_ref().trim())
        .filter(|abi| abi.len() > 2)
        .map(array_body)
        .filter(|body| !body.trim().is_empty())
        .collect();

    if bodies.is_empty() {
        return Err(Error::EmptyArtifact("every ABI is empty".to_string()).into());
    }

    Ok(format!("[{}]", bodies.join(",")))
}

fn array_body(abi: &str) -> &str {
    abi.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(abi)
}
