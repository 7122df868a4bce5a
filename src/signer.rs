// src/signer.rs
use std::fmt;
use std::str::FromStr;

use ethers::core::rand::thread_rng;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, RecoveryMessage, Signature, H256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Signs UserOperation digests with a local secp256k1 key.
///
/// The digest is signed as-is. No EIP-191 prefix is applied because the wallet
/// contract recovers against the raw userOpHash.
#[derive(Clone)]
pub struct OperationSigner {
    wallet: LocalWallet,
}

impl OperationSigner {
    /// Accepts a hex private key with or without the `0x` prefix.
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let key = private_key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        // The parse error can echo input, so it is not forwarded.
        let wallet = LocalWallet::from_str(key)
            .map_err(|_| PipelineError::Signing("invalid private key".to_string()))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// 65-byte `r || s || v` signature over `hash`, with `v` in {27, 28}.
    pub fn sign_digest(&self, hash: H256) -> Result<Bytes> {
        let signature = self
            .wallet
            .sign_hash(hash)
            .map_err(|e| PipelineError::Signing(e.to_string()))?;
        debug!("Signed {:?} with {:?}", hash, self.address());
        Ok(Bytes::from(signature.to_vec()))
    }
}

impl fmt::Debug for OperationSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Address whose key produced `signature` over the raw digest `hash`.
pub fn recover_signer(hash: H256, signature: &[u8]) -> Result<Address> {
    let signature = Signature::try_from(signature)
        .map_err(|e| PipelineError::Signing(e.to_string()))?;
    signature
        .recover(RecoveryMessage::Hash(hash))
        .map_err(|e| PipelineError::Signing(e.to_string()))
}

/// A freshly generated key meant to be registered with `addSessionKey`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKeyPair {
    pub address: Address,
    pub private_key: String,
}

impl SessionKeyPair {
    pub fn generate() -> Self {
        let wallet = LocalWallet::new(&mut thread_rng());
        Self {
            address: wallet.address(),
            private_key: format!("0x{}", hex::encode(wallet.signer().to_bytes())),
        }
    }

    pub fn signer(&self) -> Result<OperationSigner> {
        OperationSigner::from_private_key(&self.private_key)
    }
}

impl fmt::Debug for SessionKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeyPair")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
