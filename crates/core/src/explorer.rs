//! Block-explorer access for verified contract sources

use crate::{error::Error, http::HttpClient};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Etherscan multichain endpoint; the network is selected with `chainid`
pub const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/v2/api";

/// Networks the explorer can be queried on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Rinkeby,
    Goerli,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Rinkeby => 4,
            Network::Goerli => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Rinkeby => "rinkeby",
            Network::Goerli => "goerli",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "rinkeby" => Ok(Network::Rinkeby),
            "goerli" => Ok(Network::Goerli),
            other => Err(format!("unrecognized network name: {other}")),
        }
    }
}

/// One record of the explorer's `getsourcecode` answer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContractSource {
    /// Either plain source text or one of the JSON multi-file layouts
    pub source_code: String,
    #[serde(rename = "ABI", default)]
    pub abi: String,
    #[serde(default)]
    pub contract_name: String,
    /// e.g. `v0.8.10+commit.fc410830` or `vyper:0.2.4`
    #[serde(default)]
    pub compiler_version: String,
    #[serde(default)]
    pub optimization_used: String,
    #[serde(default)]
    pub runs: String,
    #[serde(default)]
    pub library: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

/// Source of verified contract code
pub trait SourceFetcher {
    fn fetch_source(&self, network: Network, address: &str) -> Result<ContractSource>;
}

/// Etherscan-compatible explorer client
#[derive(Debug, Clone)]
pub struct EtherscanClient {
    http: HttpClient,
    api_key: Option<String>,
    base_url: String,
}

impl EtherscanClient {
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self {
            http,
            api_key,
            base_url: ETHERSCAN_API_URL.to_string(),
        }
    }

    /// Point the client at another Etherscan-compatible API
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl SourceFetcher for EtherscanClient {
    fn fetch_source(&self, network: Network, address: &str) -> Result<ContractSource> {
        if !is_hex_address(address) {
            return Err(Error::Config(format!("contract address is not a hex string: {address}")).into());
        }

        tracing::info!("Fetching source of {} from {} explorer", address, network);

        let chain_id = network.chain_id().to_string();
        let mut query = vec![
            ("chainid", chain_id.as_str()),
            ("module", "contract"),
            ("action", "getsourcecode"),
            ("address", address),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        }

        let response: ApiResponse = self
            .http
            .get_json(&self.base_url, &query)
            .wrap_err("get contract source")?;

        parse_response(response)
    }
}

fn parse_response(response: ApiResponse) -> Result<ContractSource> {
    if response.status != "1" {
        let detail = match &response.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(Error::Explorer(format!("{}: {}", response.message, detail)).into());
    }

    let records: Vec<ContractSource> = serde_json::from_value(response.result)
        .map_err(|e| Error::Explorer(format!("unexpected result layout: {e}")))?;

    let record = records
        .into_iter()
        .next()
        .ok_or_else(|| Error::Explorer("empty result".to_string()))?;

    if record.source_code.trim().is_empty() {
        return Err(Error::Explorer("contract source code is not verified".to_string()).into());
    }

    Ok(record)
}

/// `0x`-prefixed (or bare) 20-byte hex address
pub fn is_hex_address(s: &str) -> bool {
    let hex = crate::utils::strip_hex_prefix(s);
    hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit())
}
