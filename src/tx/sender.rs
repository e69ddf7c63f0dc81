//! Badge transaction sender: deploy, mint and nonce-pinned replacement

use super::confirm::{ConfirmationWaiter, PendingTransaction};
use super::gas::{to_gwei, GasEstimator};
use crate::chain::{ChainProvider, SignerClient};
use crate::config::{ConfirmationConfig, MintTarget, ReplacementTarget};
use crate::contract::{token_id_from_logs, ContractArtifact, DidLabBadge};
use crate::error::{BadgeError, BadgeResult};

use ethers::contract::{ContractCall, ContractFactory};
use ethers::prelude::*;
use ethers::providers::{Http, JsonRpcClient, MiddlewareError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a confirmed mint or replacement
#[derive(Debug, Clone)]
pub struct MintOutcome {
    pub tx_hash: H256,
    pub block_number: Option<U64>,
    pub status: Option<U64>,
    pub token_id: Option<U256>,
    pub token_uri: Option<String>,
}

impl MintOutcome {
    /// Whether the receipt reports a reverted execution
    pub fn reverted(&self) -> bool {
        self.status == Some(U64::zero())
    }
}

/// Result of a confirmed deployment
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    pub address: Address,
    pub deployer: Address,
    pub tx_hash: H256,
    pub block_number: Option<U64>,
}

type MintCall<P> = ContractCall<SignerClient<P>, ()>;

/// Sends badge transactions and waits for their receipts
pub struct BadgeSender<P: JsonRpcClient + 'static = Http> {
    /// Chain provider and signer
    provider: Arc<ChainProvider<P>>,
    /// Receipt waiter
    waiter: ConfirmationWaiter<ChainProvider<P>>,
    /// Gas heuristics
    gas_estimator: GasEstimator,
    /// Confirmation timeouts
    confirmation: ConfirmationConfig,
}

impl<P: JsonRpcClient + 'static> BadgeSender<P> {
    /// Create a new badge sender
    pub fn new(
        provider: Arc<ChainProvider<P>>,
        gas_estimator: GasEstimator,
        confirmation: ConfirmationConfig,
    ) -> Self {
        Self {
            waiter: ConfirmationWaiter::new(provider.clone()),
            provider,
            gas_estimator,
            confirmation,
        }
    }

    /// Deploy the badge contract with the signer as its owner
    pub async fn deploy(&self, artifact: &ContractArtifact) -> BadgeResult<DeployOutcome> {
        let client = self.provider.client();
        let deployer = self.provider.signer_address();
        info!("Deploying {} with account: {:?}", artifact.contract_name, deployer);

        let factory = ContractFactory::new(
            artifact.abi.clone(),
            artifact.bytecode.clone(),
            client.clone(),
        );
        let deployment = factory
            .deploy(deployer)
            .map_err(|e| BadgeError::Contract(format!("Failed to encode constructor: {}", e)))?;

        let pending = client
            .send_transaction(deployment.tx, None)
            .await
            .map_err(|e| BadgeError::Contract(format!("Deployment failed: {}", e)))?;
        let tx_hash = pending.tx_hash();
        info!("Deployment tx hash: {:?}", tx_hash);

        let receipt = self
            .waiter
            .wait(&PendingTransaction::new(tx_hash, &self.confirmation))
            .await?;

        if receipt.status == Some(U64::zero()) {
            return Err(BadgeError::Contract(format!(
                "Deployment {:?} reverted in block {:?}",
                tx_hash, receipt.block_number
            )));
        }

        let address = receipt.contract_address.ok_or_else(|| {
            BadgeError::Contract(format!("Receipt for {:?} has no contract address", tx_hash))
        })?;

        Ok(DeployOutcome {
            address,
            deployer,
            tx_hash,
            block_number: receipt.block_number,
        })
    }

    /// Mint one badge to the signer at a bumped legacy gas price
    pub async fn mint(&self, target: &MintTarget) -> BadgeResult<MintOutcome> {
        let minter = self.provider.signer_address();

        let current = match self.provider.get_gas_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("Failed to fetch gas price, using fallback: {}", e);
                None
            }
        };
        let gas_price = self.gas_estimator.bumped_gas_price(current);

        info!("Minter: {:?}", minter);
        info!("Contract: {:?}", target.contract);
        info!("Token URI: {}", target.token_uri);
        info!("Chain ID: {}", self.provider.chain_id());
        info!("Using gasPrice: {} gwei", to_gwei(gas_price));

        let badge = DidLabBadge::new(target.contract, self.provider.client());

        info!("Sending mint transaction with bumped gasPrice...");
        let tx_hash = self
            .send_mint(&badge, minter, &target.token_uri, None, gas_price)
            .await?;

        let pending = PendingTransaction::new(tx_hash, &self.confirmation);
        let receipt = self.waiter.wait(&pending).await?;

        Ok(self.outcome(&badge, target.contract, tx_hash, receipt).await)
    }

    /// Re-send a mint with the nonce of a stuck transaction and a higher price
    pub async fn replace(&self, target: &ReplacementTarget) -> BadgeResult<MintOutcome> {
        let minter = self.provider.signer_address();
        let gas_price = GasEstimator::fixed_gas_price(target.gas_gwei);
        let badge = DidLabBadge::new(target.mint.contract, self.provider.client());

        info!(
            "Replacing nonce {} with higher gasPrice {} gwei...",
            target.nonce, target.gas_gwei
        );
        let tx_hash = self
            .send_mint(
                &badge,
                minter,
                &target.mint.token_uri,
                Some(U256::from(target.nonce)),
                gas_price,
            )
            .await?;

        let pending = PendingTransaction::new(tx_hash, &self.confirmation);
        let receipt = self
            .waiter
            .poll_for_receipt(&pending, pending.primary_timeout)
            .await?;

        Ok(self
            .outcome(&badge, target.mint.contract, tx_hash, receipt)
            .await)
    }

    /// Build, estimate and send `mintTo` as a legacy transaction
    async fn send_mint(
        &self,
        badge: &DidLabBadge<SignerClient<P>>,
        to: Address,
        uri: &str,
        nonce: Option<U256>,
        gas_price: U256,
    ) -> BadgeResult<H256> {
        let call = self.prepare_mint(badge, to, uri, nonce, gas_price).await?;

        let pending = call
            .send()
            .await
            .map_err(|e| BadgeError::Contract(format!("Failed to send mintTo: {}", e)))?;
        let tx_hash = pending.tx_hash();
        info!("Transaction hash: {:?}", tx_hash);

        Ok(tx_hash)
    }

    /// `mintTo` call with price, nonce and, when the node can estimate it, gas limit
    ///
    /// A node that answers the estimate with an error leaves the limit unset, so
    /// the client estimates again on send. A node that cannot be reached aborts.
    async fn prepare_mint(
        &self,
        badge: &DidLabBadge<SignerClient<P>>,
        to: Address,
        uri: &str,
        nonce: Option<U256>,
        gas_price: U256,
    ) -> BadgeResult<MintCall<P>> {
        let mut call = badge.mint_to(to, uri.to_string()).legacy().gas_price(gas_price);
        if let Some(nonce) = nonce {
            call = call.nonce(nonce);
        }

        let estimate = self.estimate_gas_limit(&call).await;
        match estimate {
            Ok(gas_limit) => call = call.gas(gas_limit),
            Err(e) if e.is_recoverable() => {
                warn!("Gas estimate failed; proceeding without explicit gasLimit: {}", e);
            }
            Err(e) => return Err(e),
        }

        Ok(call)
    }

    async fn estimate_gas_limit(&self, call: &MintCall<P>) -> BadgeResult<U256> {
        let estimate = call.estimate_gas().await.map_err(|e| {
            let answered = e.is_revert()
                || e.as_middleware_error()
                    .and_then(|err| err.as_error_response())
                    .is_some();
            if answered {
                BadgeError::GasEstimation(e.to_string())
            } else {
                BadgeError::ChainConnection {
                    chain_id: self.provider.chain_id(),
                    message: format!("eth_estimateGas failed: {}", e),
                }
            }
        })?;
        let gas_limit = self.gas_estimator.with_headroom(estimate);
        info!("Estimated gas: {} -> using {}", estimate, gas_limit);
        Ok(gas_limit)
    }

    async fn outcome(
        &self,
        badge: &DidLabBadge<SignerClient<P>>,
        contract: Address,
        tx_hash: H256,
        receipt: TransactionReceipt,
    ) -> MintOutcome {
        let token_id = self.resolve_token_id(badge, contract, &receipt).await;

        let token_uri = match token_id {
            Some(id) => match badge.token_uri(id).call().await {
                Ok(uri) => Some(uri),
                Err(e) => {
                    debug!("tokenURI({}) failed: {}", id, e);
                    None
                }
            },
            None => None,
        };

        MintOutcome {
            tx_hash,
            block_number: receipt.block_number,
            status: receipt.status,
            token_id,
            token_uri,
        }
    }

    /// `nextId() - 1`, or the `Transfer` event in the receipt when that fails
    async fn resolve_token_id(
        &self,
        badge: &DidLabBadge<SignerClient<P>>,
        contract: Address,
        receipt: &TransactionReceipt,
    ) -> Option<U256> {
        match badge.next_id().call().await {
            Ok(next) if !next.is_zero() => return Some(next - U256::one()),
            Ok(_) => debug!("nextId() returned 0, reading Transfer logs"),
            Err(e) => debug!("nextId() failed, reading Transfer logs: {}", e),
        }

        token_id_from_logs(contract, &receipt.logs)
    }
}
