// src/testing.rs
// Test doubles: an in-memory wallet and an in-process bundler.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use jsonrpsee::types::ErrorObject;

use crate::chain::WalletReader;
use crate::error::{PipelineError, Result};
use crate::hash::user_op_hash;
use crate::types::{BundleTransactionReceipt, FeeData, UserOperation, UserOperationReceipt};

pub const TEST_CHAIN_ID: u64 = 11_155_111;

#[derive(Default)]
pub struct MockReader {
    pub nonce: U256,
    pub owner: Address,
    pub session_keys: Mutex<HashMap<Address, bool>>,
    pub fee_data: FeeData,
    pub deployed: bool,
    pub nonce_reads: AtomicUsize,
    pub session_key_reads: AtomicUsize,
    /// Overrides the EntryPoint's hash answer when set.
    pub entry_point_hash: Option<H256>,
}

impl MockReader {
    pub fn deployed(nonce: u64, owner: Address) -> Self {
        Self {
            nonce: U256::from(nonce),
            owner,
            deployed: true,
            ..Default::default()
        }
    }

    pub fn grant(&self, key: Address) {
        self.session_keys.lock().unwrap().insert(key, true);
    }

    fn check(&self, wallet: Address) -> Result<()> {
        if self.deployed {
            Ok(())
        } else {
            Err(PipelineError::InvalidWallet(format!("no code at {wallet:?}")))
        }
    }
}

#[async_trait]
impl WalletReader for MockReader {
    async fn nonce(&self, wallet: Address) -> Result<U256> {
        self.check(wallet)?;
        self.nonce_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.nonce)
    }

    async fn owner(&self, wallet: Address) -> Result<Address> {
        self.check(wallet)?;
        Ok(self.owner)
    }

    async fn is_session_key(&self, wallet: Address, key: Address) -> Result<bool> {
        self.check(wallet)?;
        self.session_key_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.session_keys.lock().unwrap().get(&key).copied().unwrap_or(false))
    }

    async fn balance(&self, wallet: Address) -> Result<U256> {
        self.check(wallet)?;
        Ok(U256::zero())
    }

    async fn fee_data(&self) -> Result<FeeData> {
        Ok(self.fee_data)
    }

    async fn entry_point_user_op_hash(&self, op: &UserOperation, entry_point: Address) -> Result<H256> {
        Ok(self
            .entry_point_hash
            .unwrap_or_else(|| user_op_hash(op, entry_point, TEST_CHAIN_ID)))
    }
}

/// What the mock bundler saw and how it should answer.
#[derive(Default)]
pub struct BundlerState {
    pub submissions: AtomicUsize,
    pub received: Mutex<Vec<(UserOperation, Address)>>,
    pub receipts: Mutex<HashMap<H256, UserOperationReceipt>>,
    /// When set, every submission is rejected with this `(code, message)`.
    pub reject_with: Mutex<Option<(i32, String)>>,
}

impl BundlerState {
    pub fn reject_with(&self, code: i32, message: &str) {
        *self.reject_with.lock().unwrap() = Some((code, message.to_string()));
    }

    pub fn include(&self, user_op_hash: H256, success: bool) {
        let receipt = UserOperationReceipt {
            user_op_hash,
            sender: Address::zero(),
            nonce: U256::zero(),
            actual_gas_cost: U256::zero(),
            actual_gas_used: U256::zero(),
            success,
            reason: None,
            logs: vec![],
            receipt: BundleTransactionReceipt {
                transaction_hash: H256::repeat_byte(0x11),
                block_hash: None,
                block_number: None,
            },
        };
        self.receipts.lock().unwrap().insert(user_op_hash, receipt);
    }
}

#[rpc(server)]
pub trait MockBundler {
    #[method(name = "eth_sendUserOperation")]
    async fn send_user_operation(&self, op: UserOperation, entry_point: Address) -> RpcResult<H256>;

    #[method(name = "eth_getUserOperationReceipt")]
    async fn get_user_operation_receipt(&self, user_op_hash: H256) -> RpcResult<Option<UserOperationReceipt>>;

    #[method(name = "eth_supportedEntryPoints")]
    async fn supported_entry_points(&self) -> RpcResult<Vec<Address>>;
}

pub struct MockBundlerImpl {
    state: Arc<BundlerState>,
    entry_points: Vec<Address>,
}

#[async_trait]
impl MockBundlerServer for MockBundlerImpl {
    async fn send_user_operation(&self, op: UserOperation, entry_point: Address) -> RpcResult<H256> {
        self.state.submissions.fetch_add(1, Ordering::SeqCst);
        let rejection = self.state.reject_with.lock().unwrap().clone();
        if let Some((code, message)) = rejection {
            return Err(ErrorObject::owned(code, message, None::<()>));
        }
        let hash = user_op_hash(&op, entry_point, TEST_CHAIN_ID);
        self.state.received.lock().unwrap().push((op, entry_point));
        Ok(hash)
    }

    async fn get_user_operation_receipt(&self, user_op_hash: H256) -> RpcResult<Option<UserOperationReceipt>> {
        Ok(self.state.receipts.lock().unwrap().get(&user_op_hash).cloned())
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<Address>> {
        Ok(self.entry_points.clone())
    }
}

/// Starts a bundler on an ephemeral port. Keep the handle alive for the duration of the test.
pub async fn spawn_bundler(entry_points: Vec<Address>) -> (String, Arc<BundlerState>, ServerHandle) {
    let server = ServerBuilder::default()
        .build("127.0.0.1:0")
        .await
        .expect("bind mock bundler");
    let addr: SocketAddr = server.local_addr().expect("mock bundler address");
    let state = Arc::new(BundlerState::default());
    let handle = server.start(
        MockBundlerImpl {
            state: state.clone(),
            entry_points,
        }
        .into_rpc(),
    );
    (format!("http://{addr}"), state, handle)
}
