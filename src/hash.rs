// src/hash.rs
// UserOperation hashing for EntryPoint v0.6.
//
// The digest must agree bit-for-bit with `EntryPoint.getUserOpHash`:
//
// ```text
// inner = keccak256(abi.encode(sender, nonce, keccak256(initCode), keccak256(callData),
//                              callGasLimit, verificationGasLimit, preVerificationGas,
//                              maxFeePerGas, maxPriorityFeePerGas, keccak256(paymasterAndData)))
// hash  = keccak256(abi.encode(inner, entryPoint, chainId))
// ```

use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

use crate::types::UserOperation;

/// ABI-encodes every field except the signature, with dynamic fields replaced by their keccak256.
pub fn pack_without_signature(op: &UserOperation) -> Bytes {
    encode(&[
        Token::Address(op.sender),
        Token::Uint(op.nonce),
        Token::FixedBytes(keccak256(&op.init_code).to_vec()),
        Token::FixedBytes(keccak256(&op.call_data).to_vec()),
        Token::Uint(op.call_gas_limit),
        Token::Uint(op.verification_gas_limit),
        Token::Uint(op.pre_verification_gas),
        Token::Uint(op.max_fee_per_gas),
        Token::Uint(op.max_priority_fee_per_gas),
        Token::FixedBytes(keccak256(&op.paymaster_and_data).to_vec()),
    ])
    .into()
}

/// The digest the wallet owner (or a session key) signs.
pub fn user_op_hash(op: &UserOperation, entry_point: Address, chain_id: u64) -> H256 {
    let inner = keccak256(pack_without_signature(op));
    let outer = encode(&[
        Token::FixedBytes(inner.to_vec()),
        Token::Address(entry_point),
        Token::Uint(U256::from(chain_id)),
    ]);
    H256::from(keccak256(outer))
}
