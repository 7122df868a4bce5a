// src/contracts.rs
#![allow(clippy::too_many_arguments)]

use ethers::abi::AbiEncode;
use ethers::prelude::abigen;
use ethers::types::{Address, Bytes};

abigen!(
    SmartWallet,
    r#"[
        function getNonce() external view returns (uint256)
        function owner() external view returns (address)
        function sessionKeys(address) external view returns (bool)
        function execute(address to, uint256 value, bytes data) external returns (bytes)
        function addSessionKey(address key) external
        function removeSessionKey(address key) external
    ]"#
);

abigen!(
    EntryPoint,
    r#"[
        struct UserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; uint256 callGasLimit; uint256 verificationGasLimit; uint256 preVerificationGas; uint256 maxFeePerGas; uint256 maxPriorityFeePerGas; bytes paymasterAndData; bytes signature; }
        function getUserOpHash(UserOperation userOp) external view returns (bytes32)
    ]"#
);

impl From<&crate::types::UserOperation> for entry_point::UserOperation {
    fn from(op: &crate::types::UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code: op.init_code.clone(),
            call_data: op.call_data.clone(),
            call_gas_limit: op.call_gas_limit,
            verification_gas_limit: op.verification_gas_limit,
            pre_verification_gas: op.pre_verification_gas,
            max_fee_per_gas: op.max_fee_per_gas,
            max_priority_fee_per_gas: op.max_priority_fee_per_gas,
            paymaster_and_data: op.paymaster_and_data.clone(),
            signature: op.signature.clone(),
        }
    }
}

/// callData for `execute(to, value, data)`.
pub fn encode_execute(to: Address, value: ethers::types::U256, data: Bytes) -> Bytes {
    ExecuteCall { to, value, data }.encode().into()
}

/// callData for `addSessionKey(key)`.
pub fn encode_add_session_key(key: Address) -> Bytes {
    AddSessionKeyCall { key }.encode().into()
}

/// callData for `removeSessionKey(key)`.
pub fn encode_remove_session_key(key: Address) -> Bytes {
    RemoveSessionKeyCall { key }.encode().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    #[test]
    fn execute_transfer_encoding() {
        let to: Address = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".parse().unwrap();
        let call_data = encode_execute(to, U256::exp10(16), Bytes::default());

        let expected: Bytes = "0xb61d27f6000000000000000000000000bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb000000000000000000000000000000000000000000000000002386f26fc1000000000000000000000000000000000000000000000000000000000000000000600000000000000000000000000000000000000000000000000000000000000000"
            .parse()
            .unwrap();
        assert_eq!(call_data, expected);
    }

    #[test]
    fn session_key_selectors() {
        let key: Address = "0xcccccccccccccccccccccccccccccccccccccccc".parse().unwrap();

        let add = encode_add_session_key(key);
        assert_eq!(&add[..4], &[0xb2, 0x0b, 0x21, 0x6e]);
        assert_eq!(&add[16..], key.as_bytes());

        let remove = encode_remove_session_key(key);
        assert_eq!(&remove[..4], &[0xbf, 0x98, 0x90, 0xab]);
        assert_eq!(remove.len(), 36);
    }
}
