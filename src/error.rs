// src/error.rs
use ethers::types::H256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("RPC node unreachable: {0}")]
    Connectivity(String),

    #[error("Invalid wallet: {0}")]
    InvalidWallet(String),

    #[error("Bundler rejected operation ({code}): {message}")]
    BundlerRejected { code: i32, message: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("UserOperation hash mismatch: local {local:?}, entry point {entry_point:?}")]
    HashMismatch { local: H256, entry_point: H256 },

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl PipelineError {
    /// Rejections and invalid wallets are final for the attempt; connectivity may be retried by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Connectivity(_))
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
