//! DidLabBadge contract binding and compiled artifact loading
//!
//! Only the functions and events the scripts touch are bound. Deployment needs
//! the bytecode, which comes from the Hardhat artifact the contract toolchain
//! produces.

use crate::error::{BadgeError, BadgeResult};

use ethers::abi::{Abi, RawLog};
use ethers::contract::{abigen, EthEvent};
use ethers::types::{Address, Bytes, Log, U256};
use serde::Deserialize;
use std::path::Path;

abigen!(
    DidLabBadge,
    r#"[
        function mintTo(address to, string uri)
        function nextId() external view returns (uint256)
        function tokenURI(uint256 tokenId) external view returns (string)
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)
    ]"#
);

/// Compiled contract as written by Hardhat (`artifacts/**/<Name>.json`)
#[derive(Debug, Clone, Deserialize)]
pub struct ContractArtifact {
    #[serde(rename = "contractName", default)]
    pub contract_name: String,
    pub abi: Abi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Load and check an artifact file
    pub fn load(path: &Path) -> BadgeResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            BadgeError::Artifact(format!("Failed to read artifact {:?}: {}", path, e))
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> BadgeResult<Self> {
        let artifact: ContractArtifact = serde_json::from_str(json)
            .map_err(|e| BadgeError::Artifact(format!("Invalid artifact: {}", e)))?;

        if artifact.bytecode.is_empty() {
            return Err(BadgeError::Artifact(format!(
                "Artifact {} has no bytecode",
                artifact.contract_name
            )));
        }

        // The badge constructor takes the initial owner.
        let constructor_inputs = artifact.abi.constructor().map(|c| c.inputs.len());
        if constructor_inputs != Some(1) {
            return Err(BadgeError::Artifact(format!(
                "Artifact {} must have a constructor(address owner)",
                artifact.contract_name
            )));
        }

        Ok(artifact)
    }
}

/// Decode a log as a `Transfer` event
pub fn decode_transfer(log: &Log) -> BadgeResult<TransferFilter> {
    <TransferFilter as EthEvent>::decode_log(&RawLog::from(log.clone()))
        .map_err(|e| BadgeError::LogDecoding(e.to_string()))
}

/// Token id of the first `Transfer` emitted by `contract`. Logs that fail to
/// decode are skipped.
pub fn token_id_from_logs(contract: Address, logs: &[Log]) -> Option<U256> {
    logs.iter()
        .filter(|log| log.address == contract)
        .find_map(|log| decode_transfer(log).ok())
        .map(|transfer| transfer.token_id)
}
