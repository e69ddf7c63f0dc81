//! Error types for the badge scripts

use ethers::types::H256;
use std::time::Duration;
use thiserror::Error;

/// Main error type for deploy, mint and replace runs
#[derive(Error, Debug)]
pub enum BadgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Log decoding error: {0}")]
    LogDecoding(String),

    #[error("Transaction {tx_hash:?} not confirmed after {elapsed:?}")]
    TransactionNotConfirmed { tx_hash: H256, elapsed: Duration },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },
}

impl BadgeError {
    /// Errors the caller handles locally instead of aborting the run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BadgeError::GasEstimation(_) | BadgeError::LogDecoding(_)
        )
    }
}

/// Result type for badge operations
pub type BadgeResult<T> = Result<T, BadgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_taxonomy() {
        assert!(BadgeError::GasEstimation("reverted".into()).is_recoverable());
        assert!(BadgeError::LogDecoding("bad topic".into()).is_recoverable());
        assert!(!BadgeError::Config("missing".into()).is_recoverable());
        assert!(!BadgeError::TransactionNotConfirmed {
            tx_hash: H256::zero(),
            elapsed: Duration::from_secs(300),
        }
        .is_recoverable());
    }
}
