// src/bundler.rs
use async_trait::async_trait;
use ethers::types::{Address, H256};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::Error as RpcClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::{UserOperation, UserOperationReceipt};

/// ERC-4337 bundler endpoint.
#[async_trait]
pub trait BundlerApi: Send + Sync {
    /// `eth_sendUserOperation`. Returns the bundler's identifier for the operation.
    async fn submit(&self, op: &UserOperation, entry_point: Address) -> Result<H256>;

    /// `eth_getUserOperationReceipt`. `None` while the operation is not yet included.
    async fn get_receipt(&self, user_op_hash: H256) -> Result<Option<UserOperationReceipt>>;
}

/// JSON-RPC client for a single bundler URL.
///
/// Nothing is retried and nothing is deduplicated: a rejected or duplicate submission
/// surfaces as `BundlerRejected` and the caller decides what to rebuild. Polling
/// `get_receipt` (cadence, give-up) is also left to the caller.
#[derive(Debug, Clone)]
pub struct BundlerClient {
    client: HttpClient,
}

impl BundlerClient {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(config.request_timeout)
            .build(&config.bundler_url)
            .map_err(|e| PipelineError::Connectivity(format!("invalid bundler URL: {e}")))?;
        Ok(Self { client })
    }

    /// `eth_supportedEntryPoints`.
    pub async fn supported_entry_points(&self) -> Result<Vec<Address>> {
        self.client
            .request("eth_supportedEntryPoints", rpc_params![])
            .await
            .map_err(bundler_error)
    }
}

#[async_trait]
impl BundlerApi for BundlerClient {
    async fn submit(&self, op: &UserOperation, entry_point: Address) -> Result<H256> {
        debug!("Submitting UserOperation {:?}/{} to bundler", op.sender, op.nonce);
        let user_op_hash: H256 = self
            .client
            .request("eth_sendUserOperation", rpc_params![op, entry_point])
            .await
            .map_err(|e| {
                let err = bundler_error(e);
                warn!("Bundler refused UserOperation from {:?}: {}", op.sender, err);
                err
            })?;
        info!("Bundler accepted UserOperation {:?}", user_op_hash);
        Ok(user_op_hash)
    }

    async fn get_receipt(&self, user_op_hash: H256) -> Result<Option<UserOperationReceipt>> {
        self.client
            .request("eth_getUserOperationReceipt", rpc_params![user_op_hash])
            .await
            .map_err(bundler_error)
    }
}

/// An error object in the response is the bundler speaking; anything else never reached it intact.
fn bundler_error(err: RpcClientError) -> PipelineError {
    match err {
        RpcClientError::Call(e) => PipelineError::BundlerRejected {
            code: e.code(),
            message: e.message().to_string(),
        },
        RpcClientError::RequestTimeout => PipelineError::Connectivity("bundler request timed out".to_string()),
        other => PipelineError::Connectivity(other.to_string()),
    }
}
