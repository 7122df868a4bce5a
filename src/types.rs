// src/types.rs
use ethers::types::{Address, Bytes, H256, U256, U64};
use serde::{Deserialize, Serialize};

/// ERC-4337 (EntryPoint v0.6) UserOperation as sent to the bundler.
///
/// Integers serialize as `0x`-prefixed hex quantities and byte fields as `0x`-prefixed
/// hex, so an unset byte field goes over the wire as `"0x"`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Returns a copy carrying `signature`; every other field is untouched.
    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }
}

/// What a UserOperation should make the wallet do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Generic `execute(to, value, data)` on the wallet.
    Execute { to: Address, value: U256, data: Bytes },
    /// Pre-encoded callData, used verbatim.
    CallData(Bytes),
}

impl Action {
    /// Plain native transfer: `execute(to, value, 0x)`.
    pub fn transfer(to: Address, value: U256) -> Self {
        Action::Execute {
            to,
            value,
            data: Bytes::default(),
        }
    }
}

/// Fee suggestion from the node. `None` means the oracle had nothing to offer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeData {
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub address: Address,
    pub owner: Address,
    pub nonce: U256,
    pub balance: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub is_owner: bool,
    pub is_session_key: bool,
    pub can_sign: bool,
}

/// Transaction part of a UserOperation receipt. This covers the whole bundle, not only the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleTransactionReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_hash: Option<H256>,
    #[serde(default)]
    pub block_number: Option<U64>,
}

/// Result of `eth_getUserOperationReceipt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    #[serde(default)]
    pub sender: Address,
    #[serde(default)]
    pub nonce: U256,
    #[serde(default)]
    pub actual_gas_cost: U256,
    #[serde(default)]
    pub actual_gas_used: U256,
    /// Did the inner call complete without revert.
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub logs: Vec<serde_json::Value>,
    pub receipt: BundleTransactionReceipt,
}

impl UserOperationReceipt {
    pub fn transaction_hash(&self) -> H256 {
        self.receipt.transaction_hash
    }
}

/// Where a submitted operation stands from the caller's point of view.
///
/// `Included` is terminal whether or not the inner call reverted. There is no
/// terminal "dropped" state: a receipt that never shows up stays `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum OperationStatus {
    Pending,
    #[serde(rename_all = "camelCase")]
    Included {
        success: bool,
        transaction_hash: H256,
        reason: Option<String>,
    },
}

impl From<Option<UserOperationReceipt>> for OperationStatus {
    fn from(receipt: Option<UserOperationReceipt>) -> Self {
        match receipt {
            None => OperationStatus::Pending,
            Some(receipt) => OperationStatus::Included {
                success: receipt.success,
                transaction_hash: receipt.transaction_hash(),
                reason: receipt.reason,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: String,
    /// Unix seconds.
    pub timestamp: u64,
}

/// Bundler's answer to `eth_sendUserOperation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedOperation {
    /// Identifier returned by the bundler (the userOpHash for ERC-4337 bundlers).
    pub user_op_hash: H256,
    pub sender: Address,
    pub nonce: U256,
}
