//! Confirmation waiting for submitted transactions
//!
//! A wait runs as a small state machine:
//! - `Primary`: the ledger's own confirmation wait, bounded by the primary timeout
//! - `Fallback`: receipt polling against an independent, usually longer ceiling
//! - `Confirmed` / `Failed`: terminal
//!
//! Waiting is purely observational. Nothing here resubmits a transaction.

use crate::chain::Ledger;
use crate::config::ConfirmationConfig;
use crate::error::{BadgeError, BadgeResult};

use chrono::{DateTime, Utc};
use ethers::types::{TransactionReceipt, H256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// A submitted transaction awaiting its receipt
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub tx_hash: H256,
    pub submitted_at: DateTime<Utc>,
    pub confirmations: usize,
    pub primary_timeout: Duration,
    pub fallback_timeout: Duration,
    pub poll_interval: Duration,
}

impl PendingTransaction {
    /// Track a transaction the network has just accepted
    pub fn new(tx_hash: H256, config: &ConfirmationConfig) -> Self {
        Self {
            tx_hash,
            submitted_at: Utc::now(),
            confirmations: config.confirmations.max(1),
            primary_timeout: config.primary_timeout(),
            fallback_timeout: config.fallback_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

#[derive(Debug)]
enum WaitPhase {
    Primary,
    Fallback { started: Instant, ceiling: Duration },
    Confirmed(TransactionReceipt),
    Failed { elapsed: Duration },
}

/// Turns a submitted transaction hash into a receipt or a definitive failure
pub struct ConfirmationWaiter<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> ConfirmationWaiter<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Wait through the ledger's confirmation mechanism, falling back to
    /// receipt polling if it fails or times out
    pub async fn wait(&self, pending: &PendingTransaction) -> BadgeResult<TransactionReceipt> {
        self.run(pending, WaitPhase::Primary).await
    }

    /// Poll for a receipt only, giving up once `ceiling` elapses
    pub async fn poll_for_receipt(
        &self,
        pending: &PendingTransaction,
        ceiling: Duration,
    ) -> BadgeResult<TransactionReceipt> {
        let phase = WaitPhase::Fallback {
            started: Instant::now(),
            ceiling,
        };
        self.run(pending, phase).await
    }

    async fn run(
        &self,
        pending: &PendingTransaction,
        mut phase: WaitPhase,
    ) -> BadgeResult<TransactionReceipt> {
        debug!(
            "Waiting for {:?} (submitted {})",
            pending.tx_hash,
            pending.submitted_at.to_rfc3339()
        );

        loop {
            phase = match phase {
                WaitPhase::Primary => self.primary(pending).await,
                WaitPhase::Fallback { started, ceiling } => {
                    self.poll_once(pending, started, ceiling).await
                }
                WaitPhase::Confirmed(receipt) => {
                    info!(
                        "Transaction {:?} confirmed in block {:?}",
                        pending.tx_hash, receipt.block_number
                    );
                    return Ok(receipt);
                }
                WaitPhase::Failed { elapsed } => {
                    return Err(BadgeError::TransactionNotConfirmed {
                        tx_hash: pending.tx_hash,
                        elapsed,
                    });
                }
            };
        }
    }

    async fn primary(&self, pending: &PendingTransaction) -> WaitPhase {
        // The ledger is handed the timeout too; this bound holds even if it ignores it.
        let wait = self.ledger.wait_for_confirmations(
            pending.tx_hash,
            pending.confirmations,
            pending.primary_timeout,
        );

        let error = match timeout(pending.primary_timeout, wait).await {
            Ok(Ok(receipt)) => return WaitPhase::Confirmed(receipt),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", pending.primary_timeout),
        };

        warn!(
            "Waiting for {:?} failed ({}); polling for up to {:?}",
            pending.tx_hash, error, pending.fallback_timeout
        );

        WaitPhase::Fallback {
            started: Instant::now(),
            ceiling: pending.fallback_timeout,
        }
    }

    async fn poll_once(
        &self,
        pending: &PendingTransaction,
        started: Instant,
        ceiling: Duration,
    ) -> WaitPhase {
        let elapsed = started.elapsed();
        if elapsed >= ceiling {
            return WaitPhase::Failed { elapsed };
        }

        // A receipt that arrives past the ceiling must not count as success.
        let remaining = ceiling - elapsed;
        match timeout(remaining, self.ledger.get_transaction_receipt(pending.tx_hash)).await {
            Ok(Ok(Some(receipt))) => return WaitPhase::Confirmed(receipt),
            Ok(Ok(None)) => {
                debug!("No receipt yet for {:?} after {:?}", pending.tx_hash, elapsed);
            }
            Ok(Err(e)) => {
                debug!("Receipt query for {:?} failed: {}", pending.tx_hash, e);
            }
            Err(_) => {
                return WaitPhase::Failed {
                    elapsed: started.elapsed(),
                };
            }
        }

        sleep(pending.poll_interval).await;
        WaitPhase::Fallback { started, ceiling }
    }
}
