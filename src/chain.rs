// src/chain.rs
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::contract::ContractError;
use ethers::prelude::*;
use ethers::providers::MiddlewareError;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::contracts::{EntryPoint, SmartWallet};
use crate::error::{PipelineError, Result};
use crate::types::{FeeData, UserOperation, WalletInfo};

/// Priority fee suggested when the chain reports a base fee (same default as ethers' `getFeeData`).
const DEFAULT_PRIORITY_FEE_WEI: u64 = 1_500_000_000;

/// Read-only view of a smart-contract wallet and the network it lives on.
///
/// Every call goes to the node; nothing is cached between calls.
#[async_trait]
pub trait WalletReader: Send + Sync {
    /// `getNonce()` on the wallet.
    async fn nonce(&self, wallet: Address) -> Result<U256>;

    /// `owner()` on the wallet.
    async fn owner(&self, wallet: Address) -> Result<Address>;

    /// `sessionKeys(key)` on the wallet.
    async fn is_session_key(&self, wallet: Address, key: Address) -> Result<bool>;

    /// Native balance held by the wallet.
    async fn balance(&self, wallet: Address) -> Result<U256>;

    /// Current EIP-1559 fee suggestion.
    async fn fee_data(&self) -> Result<FeeData>;

    /// `getUserOpHash(op)` as computed by the EntryPoint contract itself.
    async fn entry_point_user_op_hash(&self, op: &UserOperation, entry_point: Address) -> Result<H256>;

    /// Owner, nonce and balance in one snapshot (three separate reads, not atomic).
    async fn wallet_info(&self, wallet: Address) -> Result<WalletInfo> {
        let owner = self.owner(wallet).await?;
        let nonce = self.nonce(wallet).await?;
        let balance = self.balance(wallet).await?;
        Ok(WalletInfo {
            address: wallet,
            owner,
            nonce,
            balance,
        })
    }
}

/// `WalletReader` backed by a JSON-RPC node.
#[derive(Debug, Clone)]
pub struct ChainClient<P = Http> {
    provider: Arc<Provider<P>>,
    request_timeout: Duration,
}

impl ChainClient<Http> {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| PipelineError::Connectivity(format!("invalid RPC URL: {e}")))?;
        Ok(Self::with_provider(provider, config.request_timeout))
    }
}

impl<P: JsonRpcClient + 'static> ChainClient<P> {
    pub fn with_provider(provider: Provider<P>, request_timeout: Duration) -> Self {
        Self {
            provider: Arc::new(provider),
            request_timeout,
        }
    }

    fn wallet(&self, address: Address) -> SmartWallet<Provider<P>> {
        SmartWallet::new(address, self.provider.clone())
    }

    async fn timed<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.request_timeout, fut)
            .await
            .map_err(|_| {
                PipelineError::Connectivity(format!("{what} timed out after {:?}", self.request_timeout))
            })?
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id = self
            .timed("eth_chainId", async {
                self.provider.get_chainid().await.map_err(provider_error)
            })
            .await?;
        Ok(id.low_u64())
    }
}

#[async_trait]
impl<P: JsonRpcClient + 'static> WalletReader for ChainClient<P> {
    async fn nonce(&self, wallet: Address) -> Result<U256> {
        let nonce = self
            .timed("getNonce", async {
                self.wallet(wallet)
                    .get_nonce()
                    .call()
                    .await
                    .map_err(|e| contract_error(wallet, e))
            })
            .await?;
        debug!("Nonce for {:?} is {}", wallet, nonce);
        Ok(nonce)
    }

    async fn owner(&self, wallet: Address) -> Result<Address> {
        self.timed("owner", async {
            self.wallet(wallet)
                .owner()
                .call()
                .await
                .map_err(|e| contract_error(wallet, e))
        })
        .await
    }

    async fn is_session_key(&self, wallet: Address, key: Address) -> Result<bool> {
        self.timed("sessionKeys", async {
            self.wallet(wallet)
                .session_keys(key)
                .call()
                .await
                .map_err(|e| contract_error(wallet, e))
        })
        .await
    }

    async fn balance(&self, wallet: Address) -> Result<U256> {
        self.timed("eth_getBalance", async {
            self.provider.get_balance(wallet, None).await.map_err(provider_error)
        })
        .await
    }

    async fn fee_data(&self) -> Result<FeeData> {
        let block = self
            .timed("eth_getBlockByNumber", async {
                self.provider
                    .get_block(BlockNumber::Latest)
                    .await
                    .map_err(provider_error)
            })
            .await?;
        Ok(fee_data_from_base_fee(block.and_then(|b| b.base_fee_per_gas)))
    }

    async fn entry_point_user_op_hash(&self, op: &UserOperation, entry_point: Address) -> Result<H256> {
        let hash = self
            .timed("getUserOpHash", async {
                EntryPoint::new(entry_point, self.provider.clone())
                    .get_user_op_hash(op.into())
                    .call()
                    .await
                    .map_err(|e| contract_error(entry_point, e))
            })
            .await?;
        Ok(H256::from(hash))
    }
}

/// Fee suggestion derived from the latest base fee: `maxFee = 2 * baseFee + priority`.
/// Pre-London chains report no base fee and get no suggestion, and neither does a base
/// fee too large to double.
pub fn fee_data_from_base_fee(base_fee: Option<U256>) -> FeeData {
    let priority = U256::from(DEFAULT_PRIORITY_FEE_WEI);
    let max_fee = base_fee
        .and_then(|base_fee| base_fee.checked_mul(U256::from(2)))
        .and_then(|doubled| doubled.checked_add(priority));
    match max_fee {
        Some(max_fee) => FeeData {
            max_fee_per_gas: Some(max_fee),
            max_priority_fee_per_gas: Some(priority),
        },
        None => {
            if base_fee.is_some() {
                warn!("Ignoring out-of-range base fee {:?}", base_fee);
            }
            FeeData::default()
        }
    }
}

fn provider_error(e: ProviderError) -> PipelineError {
    PipelineError::Connectivity(e.to_string())
}

/// A node that answered with an error (revert, bad call) or with undecodable data points
/// at the contract; a node that did not answer is a connectivity problem.
fn contract_error<M: Middleware>(contract: Address, err: ContractError<M>) -> PipelineError {
    match err {
        ContractError::MiddlewareError { e } => match MiddlewareError::as_error_response(&e) {
            Some(rpc_err) => PipelineError::InvalidWallet(format!("{contract:?}: {rpc_err}")),
            None => PipelineError::Connectivity(e.to_string()),
        },
        ContractError::ProviderError { e } => PipelineError::Connectivity(e.to_string()),
        other => PipelineError::InvalidWallet(format!("{contract:?}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::AbiEncode;
    use ethers::providers::{JsonRpcError, MockProvider, MockResponse};

    fn client() -> (ChainClient<MockProvider>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        (ChainClient::with_provider(provider, Duration::from_secs(5)), mock)
    }

    fn wallet() -> Address {
        Address::repeat_byte(0xaa)
    }

    #[tokio::test]
    async fn reads_nonce() {
        let (client, mock) = client();
        mock.push::<Bytes, Bytes>(U256::from(5).encode().into()).unwrap();

        assert_eq!(client.nonce(wallet()).await.unwrap(), U256::from(5));
    }

    #[tokio::test]
    async fn reads_session_key_flag() {
        let (client, mock) = client();
        mock.push::<Bytes, Bytes>(true.encode().into()).unwrap();

        assert!(client.is_session_key(wallet(), Address::repeat_byte(0xcc)).await.unwrap());
    }

    #[tokio::test]
    async fn empty_call_result_is_invalid_wallet() {
        // eth_call against an address without code returns 0x.
        let (client, mock) = client();
        mock.push::<Bytes, Bytes>(Bytes::default()).unwrap();

        let err = client.owner(wallet()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidWallet(_)), "{err:?}");
    }

    #[tokio::test]
    async fn reverted_call_is_invalid_wallet() {
        let (client, mock) = client();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code: 3,
            message: "execution reverted".to_string(),
            data: None,
        }));

        let err = client.owner(wallet()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidWallet(_)), "{err:?}");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_response_is_connectivity() {
        let (client, _mock) = client();

        let err = client.nonce(wallet()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Connectivity(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn wallet_info_combines_reads() {
        let (client, mock) = client();
        let owner = Address::repeat_byte(0x01);
        // Responses pop last-in first-out: owner, nonce, balance.
        mock.push::<U256, U256>(U256::exp10(16)).unwrap();
        mock.push::<Bytes, Bytes>(U256::from(7).encode().into()).unwrap();
        mock.push::<Bytes, Bytes>(owner.encode().into()).unwrap();

        let info = client.wallet_info(wallet()).await.unwrap();
        assert_eq!(info.owner, owner);
        assert_eq!(info.nonce, U256::from(7));
        assert_eq!(info.balance, U256::exp10(16));
    }

    #[test]
    fn fee_data_without_base_fee_is_empty() {
        assert_eq!(fee_data_from_base_fee(None), FeeData::default());
    }

    #[test]
    fn fee_data_from_base_fee_doubles_base() {
        let fees = fee_data_from_base_fee(Some(U256::from(10_000_000_000u64)));
        assert_eq!(fees.max_priority_fee_per_gas, Some(U256::from(1_500_000_000u64)));
        assert_eq!(fees.max_fee_per_gas, Some(U256::from(21_500_000_000u64)));
    }

    #[test]
    fn fee_data_from_huge_base_fee_is_empty() {
        assert_eq!(fee_data_from_base_fee(Some(U256::MAX)), FeeData::default());
        assert_eq!(fee_data_from_base_fee(Some(U256::MAX / 2)), FeeData::default());
    }
}
