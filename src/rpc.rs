// src/rpc.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::{parse_units, ParseUnits};
use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::error::{ErrorObject, ErrorObjectOwned, INVALID_PARAMS_CODE};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info};

use crate::error::PipelineError;
use crate::pipeline::UserOpPipeline;
use crate::session::SessionKeyController;
use crate::signer::{OperationSigner, SessionKeyPair};
use crate::types::{Action, Authorization, Health, OperationStatus, UserOperationReceipt, WalletInfo};

const SERVER_ERROR_CODE: i32 = -32000;

type SenderLocks = Arc<Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>>;

#[rpc(server, namespace = "wallet")]
pub trait WalletRpc {
    /// Sends `amount` ether (decimal string, e.g. "0.01") from `wallet` to `to`.
    #[method(name = "transferEth")]
    async fn transfer_eth(&self, wallet: Address, to: Address, amount: String, signer_key: String) -> RpcResult<H256>;

    /// Generic `execute(to, value, data)` on the wallet.
    #[method(name = "execute")]
    async fn execute(
        &self,
        wallet: Address,
        to: Address,
        value: U256,
        data: Bytes,
        signer_key: String,
    ) -> RpcResult<H256>;

    #[method(name = "addSessionKey")]
    async fn add_session_key(&self, wallet: Address, session_key: Address, owner_key: String) -> RpcResult<H256>;

    #[method(name = "removeSessionKey")]
    async fn remove_session_key(&self, wallet: Address, session_key: Address, owner_key: String) -> RpcResult<H256>;

    /// Fresh random key pair. Nothing is stored server-side.
    #[method(name = "generateSessionKey")]
    async fn generate_session_key(&self) -> RpcResult<SessionKeyPair>;

    #[method(name = "checkSessionKey")]
    async fn check_session_key(&self, wallet: Address, address: Address) -> RpcResult<Authorization>;

    #[method(name = "getReceipt")]
    async fn get_receipt(&self, user_op_hash: H256) -> RpcResult<Option<UserOperationReceipt>>;

    #[method(name = "getStatus")]
    async fn get_status(&self, user_op_hash: H256) -> RpcResult<OperationStatus>;

    #[method(name = "info")]
    async fn info(&self, wallet: Address) -> RpcResult<WalletInfo>;

    /// Liveness only; touches neither the node nor the bundler.
    #[method(name = "health")]
    async fn health(&self) -> RpcResult<Health>;
}

pub struct WalletRpcImpl {
    pipeline: Arc<UserOpPipeline>,
    sessions: SessionKeyController,
    // One lock per sender so this service never races itself on a nonce.
    senders: SenderLocks,
}

/// Holds a sender's lock. The sender's table entry goes away with the last guard.
struct SenderGuard {
    wallet: Address,
    senders: SenderLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SenderGuard {
    fn drop(&mut self) {
        // Release first so the table holds the only reference when nobody is waiting.
        self.guard.take();
        let mut senders = self.senders.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if senders.get(&self.wallet).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            senders.remove(&self.wallet);
        }
    }
}

impl WalletRpcImpl {
    pub fn new(pipeline: Arc<UserOpPipeline>) -> Self {
        Self {
            sessions: SessionKeyController::new(pipeline.clone()),
            pipeline,
            senders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn sender_lock(&self, wallet: Address) -> Arc<AsyncMutex<()>> {
        let mut senders = self.senders.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Entries left behind by waits that were abandoned before acquiring.
        senders.retain(|_, lock| Arc::strong_count(lock) > 1);
        senders.entry(wallet).or_default().clone()
    }

    async fn lock_sender(&self, wallet: Address) -> SenderGuard {
        let guard = self.sender_lock(wallet).lock_owned().await;
        SenderGuard {
            wallet,
            senders: self.senders.clone(),
            guard: Some(guard),
        }
    }

    async fn send(&self, wallet: Address, action: Action, signer_key: &str) -> RpcResult<H256> {
        let signer = OperationSigner::from_private_key(signer_key).map_err(rpc_error)?;
        let _guard = self.lock_sender(wallet).await;

        match self.pipeline.send(wallet, action, &signer).await {
            Ok(submitted) => {
                info!("Submitted {:?} for {:?}", submitted.user_op_hash, wallet);
                Ok(submitted.user_op_hash)
            }
            Err(e) => {
                error!("Failed to submit operation for {:?}: {}", wallet, e);
                Err(rpc_error(e))
            }
        }
    }
}

#[async_trait]
impl WalletRpcServer for WalletRpcImpl {
    async fn transfer_eth(&self, wallet: Address, to: Address, amount: String, signer_key: String) -> RpcResult<H256> {
        debug!("Received transfer request: {:?} -> {:?} ({} ETH)", wallet, to, amount);
        let value = parse_ether_amount(&amount).map_err(rpc_error)?;
        self.send(wallet, Action::transfer(to, value), &signer_key).await
    }

    async fn execute(
        &self,
        wallet: Address,
        to: Address,
        value: U256,
        data: Bytes,
        signer_key: String,
    ) -> RpcResult<H256> {
        debug!("Received execute request: {:?} -> {:?} (value {})", wallet, to, value);
        self.send(wallet, Action::Execute { to, value, data }, &signer_key).await
    }

    async fn add_session_key(&self, wallet: Address, session_key: Address, owner_key: String) -> RpcResult<H256> {
        debug!("Received session key grant: {:?} on {:?}", session_key, wallet);
        let owner = OperationSigner::from_private_key(&owner_key).map_err(rpc_error)?;
        let _guard = self.lock_sender(wallet).await;
        self.sessions
            .add_session_key(wallet, session_key, &owner)
            .await
            .map(|submitted| submitted.user_op_hash)
            .map_err(|e| {
                error!("Failed to add session key on {:?}: {}", wallet, e);
                rpc_error(e)
            })
    }

    async fn remove_session_key(&self, wallet: Address, session_key: Address, owner_key: String) -> RpcResult<H256> {
        debug!("Received session key revocation: {:?} on {:?}", session_key, wallet);
        let owner = OperationSigner::from_private_key(&owner_key).map_err(rpc_error)?;
        let _guard = self.lock_sender(wallet).await;
        self.sessions
            .remove_session_key(wallet, session_key, &owner)
            .await
            .map(|submitted| submitted.user_op_hash)
            .map_err(|e| {
                error!("Failed to remove session key on {:?}: {}", wallet, e);
                rpc_error(e)
            })
    }

    async fn generate_session_key(&self) -> RpcResult<SessionKeyPair> {
        let pair = SessionKeyPair::generate();
        info!("Generated session key {:?}", pair.address);
        Ok(pair)
    }

    async fn check_session_key(&self, wallet: Address, address: Address) -> RpcResult<Authorization> {
        self.sessions.authorization(wallet, address).await.map_err(rpc_error)
    }

    async fn get_receipt(&self, user_op_hash: H256) -> RpcResult<Option<UserOperationReceipt>> {
        self.pipeline.receipt(user_op_hash).await.map_err(rpc_error)
    }

    async fn get_status(&self, user_op_hash: H256) -> RpcResult<OperationStatus> {
        self.pipeline.status(user_op_hash).await.map_err(rpc_error)
    }

    async fn info(&self, wallet: Address) -> RpcResult<WalletInfo> {
        self.pipeline.reader().wallet_info(wallet).await.map_err(rpc_error)
    }

    async fn health(&self) -> RpcResult<Health> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Ok(Health {
            status: "ok".to_string(),
            timestamp,
        })
    }
}

/// Decimal ether string to wei. Negative amounts are refused rather than wrapped.
fn parse_ether_amount(amount: &str) -> Result<U256, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidParameters(format!("invalid ether amount {amount:?}: {reason}"));
    match parse_units(amount.trim(), "ether").map_err(|e| invalid(e.to_string()))? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => Err(invalid("amount is negative".to_string())),
    }
}

/// Bundler rejections pass through with their own code and message.
fn rpc_error(err: PipelineError) -> ErrorObjectOwned {
    match err {
        PipelineError::BundlerRejected { code, message } => ErrorObject::owned(code, message, None::<()>),
        e @ (PipelineError::InvalidParameters(_) | PipelineError::Signing(_)) => {
            ErrorObject::owned(INVALID_PARAMS_CODE, e.to_string(), None::<()>)
        }
        e => ErrorObject::owned(SERVER_ERROR_CODE, e.to_string(), None::<()>),
    }
}
