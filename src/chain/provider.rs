//! Chain provider and signer client for the configured network

use super::Ledger;
use crate::config::NetworkConfig;
use crate::error::{BadgeError, BadgeResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, JsonRpcClient, PendingTransaction, Provider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Provider wrapped with the signer that sends every script transaction
pub type SignerClient<P = Http> = SignerMiddleware<Provider<P>, LocalWallet>;

/// RPC provider plus signer for a single network
pub struct ChainProvider<P: JsonRpcClient = Http> {
    /// Network configuration
    config: NetworkConfig,
    /// Read-only provider
    http: Provider<P>,
    /// Signing client used for contract calls and deployment
    client: Arc<SignerClient<P>>,
    /// Chain ID reported by the RPC
    chain_id: u64,
}

impl ChainProvider<Http> {
    /// Connect to the configured RPC and attach the signer
    pub async fn connect(
        config: NetworkConfig,
        private_key: &str,
        poll_interval: Duration,
    ) -> BadgeResult<Self> {
        let http = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| BadgeError::ChainConnection {
                chain_id: config.chain_id,
                message: format!("Invalid RPC URL {}: {}", config.rpc_url, e),
            })?
            .interval(poll_interval);
        debug!("Added HTTP provider for {}: {}", config.name, config.rpc_url);

        let chain_id = http
            .get_chainid()
            .await
            .map_err(|e| BadgeError::ChainConnection {
                chain_id: config.chain_id,
                message: e.to_string(),
            })?
            .as_u64();

        if chain_id != config.chain_id {
            warn!(
                "RPC reports chain {} but {} is configured as chain {}",
                chain_id, config.name, config.chain_id
            );
        }

        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| BadgeError::Wallet(format!("Invalid private key: {}", e)))?
            .with_chain_id(chain_id);

        info!("Connected to {} (chain {})", config.name, chain_id);

        Ok(Self::with_provider(config, http, wallet))
    }
}

impl<P: JsonRpcClient> ChainProvider<P> {
    /// Wrap an already constructed provider; the wallet's chain ID is taken
    /// as the network's
    pub fn with_provider(config: NetworkConfig, provider: Provider<P>, wallet: LocalWallet) -> Self
    where
        P: Clone,
    {
        let chain_id = wallet.chain_id();
        let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet));

        Self {
            config,
            http: provider,
            client,
            chain_id,
        }
    }

    /// Get the signing client
    pub fn client(&self) -> Arc<SignerClient<P>> {
        self.client.clone()
    }

    /// Address of the signer
    pub fn signer_address(&self) -> Address {
        self.client.address()
    }

    /// Chain ID reported by the RPC
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Network name from configuration
    pub fn network_name(&self) -> &str {
        &self.config.name
    }

    /// Current legacy gas price
    pub async fn get_gas_price(&self) -> BadgeResult<U256> {
        self.http
            .get_gas_price()
            .await
            .map_err(|e| BadgeError::GasEstimation(e.to_string()))
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> Ledger for ChainProvider<P> {
    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> BadgeResult<Option<TransactionReceipt>> {
        self.http
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| BadgeError::ChainConnection {
                chain_id: self.chain_id,
                message: e.to_string(),
            })
    }

    async fn wait_for_confirmations(
        &self,
        tx_hash: H256,
        confirmations: usize,
        timeout: Duration,
    ) -> BadgeResult<TransactionReceipt> {
        let pending = PendingTransaction::new(tx_hash, &self.http).confirmations(confirmations);

        match tokio::time::timeout(timeout, pending).await {
            Ok(Ok(Some(receipt))) => Ok(receipt),
            Ok(Ok(None)) => Err(BadgeError::ChainConnection {
                chain_id: self.chain_id,
                message: format!("Transaction {:?} dropped from mempool", tx_hash),
            }),
            Ok(Err(e)) => Err(BadgeError::ChainConnection {
                chain_id: self.chain_id,
                message: e.to_string(),
            }),
            Err(_) => Err(BadgeError::Timeout {
                operation: format!("{} confirmation(s) of {:?}", confirmations, tx_hash),
            }),
        }
    }
}
