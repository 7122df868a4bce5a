// src/builder.rs
use std::sync::Arc;

use ethers::types::{Address, Bytes, U256};
use tracing::{debug, info};

use crate::chain::WalletReader;
use crate::contracts::encode_execute;
use crate::error::Result;
use crate::types::{Action, FeeData, UserOperation};

const GWEI: u64 = 1_000_000_000;

/// Fixed gas budgets and fee floors.
///
/// Gas limits are not simulated. They are set high enough for `execute` and the session-key
/// calls on the wallet contract, so every operation prepays for more gas than it uses and an
/// unusually heavy inner call can still run out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    /// Used when the node offers no max fee.
    pub max_fee_floor: U256,
    /// Used when the node offers no priority fee.
    pub max_priority_fee_floor: U256,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            call_gas_limit: U256::from(400_000),
            verification_gas_limit: U256::from(400_000),
            pre_verification_gas: U256::from(60_000),
            max_fee_floor: U256::from(20 * GWEI),
            max_priority_fee_floor: U256::from(2 * GWEI),
        }
    }
}

impl GasPolicy {
    /// `(maxFeePerGas, maxPriorityFeePerGas)`, node suggestion first, floors otherwise.
    pub fn fees(&self, suggested: FeeData) -> (U256, U256) {
        (
            suggested.max_fee_per_gas.unwrap_or(self.max_fee_floor),
            suggested.max_priority_fee_per_gas.unwrap_or(self.max_priority_fee_floor),
        )
    }
}

/// Assembles unsigned UserOperations for a wallet.
///
/// The nonce is read from the wallet on every build. Two builds for the same sender
/// running at once get the same nonce, and only one of them will be accepted downstream.
pub struct UserOperationBuilder {
    reader: Arc<dyn WalletReader>,
    policy: GasPolicy,
}

impl UserOperationBuilder {
    pub fn new(reader: Arc<dyn WalletReader>) -> Self {
        Self::with_policy(reader, GasPolicy::default())
    }

    pub fn with_policy(reader: Arc<dyn WalletReader>, policy: GasPolicy) -> Self {
        Self { reader, policy }
    }

    /// Builds an operation with an empty signature. Which key signs it is the caller's business.
    pub async fn build(&self, wallet: Address, action: Action) -> Result<UserOperation> {
        let nonce = self.reader.nonce(wallet).await?;
        let fee_data = self.reader.fee_data().await?;
        let (max_fee_per_gas, max_priority_fee_per_gas) = self.policy.fees(fee_data);
        if fee_data.max_fee_per_gas.is_none() || fee_data.max_priority_fee_per_gas.is_none() {
            debug!("Fee oracle incomplete, using floors where missing");
        }

        let call_data = Self::call_data(action);

        let op = UserOperation {
            sender: wallet,
            nonce,
            init_code: Bytes::default(),
            call_data,
            call_gas_limit: self.policy.call_gas_limit,
            verification_gas_limit: self.policy.verification_gas_limit,
            pre_verification_gas: self.policy.pre_verification_gas,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            paymaster_and_data: Bytes::default(),
            signature: Bytes::default(),
        };

        info!(
            "Built UserOperation for {:?} with nonce {} (maxFee {}, priority {})",
            wallet, nonce, max_fee_per_gas, max_priority_fee_per_gas
        );
        Ok(op)
    }

    fn call_data(action: Action) -> Bytes {
        match action {
            Action::CallData(data) => data,
            Action::Execute { to, value, data } => encode_execute(to, value, data),
        }
    }
}
