//! Chain module - RPC access for the configured network
//!
//! The confirmation waiter only sees the [`Ledger`] trait, so it can be driven
//! by a mock in tests and by [`ChainProvider`] at runtime.

pub mod provider;

pub use provider::{ChainProvider, SignerClient};

use crate::error::BadgeResult;

use async_trait::async_trait;
use ethers::types::{TransactionReceipt, H256};
use std::time::Duration;

/// Read-only ledger queries used while waiting for a transaction
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch a receipt without blocking; `None` until the transaction is mined
    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> BadgeResult<Option<TransactionReceipt>>;

    /// Block until `confirmations` blocks include the transaction, or fail
    /// once `timeout` elapses
    async fn wait_for_confirmations(
        &self,
        tx_hash: H256,
        confirmations: usize,
        timeout: Duration,
    ) -> BadgeResult<TransactionReceipt>;
}
