// src/session.rs
use std::sync::Arc;

use ethers::types::Address;
use tracing::{debug, info};

use crate::contracts::{encode_add_session_key, encode_remove_session_key};
use crate::error::{PipelineError, Result};
use crate::pipeline::UserOpPipeline;
use crate::signer::OperationSigner;
use crate::types::{Action, Authorization, SubmittedOperation};

/// Grants, revokes and checks session keys on a wallet.
///
/// The grant lives only in the wallet's `sessionKeys` mapping; every check reads it again.
/// Who may grant is enforced by the contract, so a session key used as `owner` here
/// produces an operation the wallet rejects at validation.
pub struct SessionKeyController {
    pipeline: Arc<UserOpPipeline>,
}

impl SessionKeyController {
    pub fn new(pipeline: Arc<UserOpPipeline>) -> Self {
        Self { pipeline }
    }

    /// Self-call to `addSessionKey(session_key)`, signed by `owner`.
    pub async fn add_session_key(
        &self,
        wallet: Address,
        session_key: Address,
        owner: &OperationSigner,
    ) -> Result<SubmittedOperation> {
        check_key(session_key)?;
        let submitted = self
            .pipeline
            .send(wallet, Action::CallData(encode_add_session_key(session_key)), owner)
            .await?;
        info!("Session key {:?} grant for {:?} submitted as {:?}", session_key, wallet, submitted.user_op_hash);
        Ok(submitted)
    }

    /// Self-call to `removeSessionKey(session_key)`, signed by `owner`.
    pub async fn remove_session_key(
        &self,
        wallet: Address,
        session_key: Address,
        owner: &OperationSigner,
    ) -> Result<SubmittedOperation> {
        check_key(session_key)?;
        let submitted = self
            .pipeline
            .send(wallet, Action::CallData(encode_remove_session_key(session_key)), owner)
            .await?;
        info!("Session key {:?} revocation for {:?} submitted as {:?}", session_key, wallet, submitted.user_op_hash);
        Ok(submitted)
    }

    pub async fn authorization(&self, wallet: Address, address: Address) -> Result<Authorization> {
        if address.is_zero() {
            return Ok(Authorization {
                is_owner: false,
                is_session_key: false,
                can_sign: false,
            });
        }

        let reader = self.pipeline.reader();
        let is_owner = reader.owner(wallet).await? == address;
        let is_session_key = reader.is_session_key(wallet, address).await?;
        debug!(
            "Authorization of {:?} on {:?}: owner={} session_key={}",
            address, wallet, is_owner, is_session_key
        );

        Ok(Authorization {
            is_owner,
            is_session_key,
            can_sign: is_owner || is_session_key,
        })
    }

    /// Whether `address` is the owner or a registered session key of `wallet`.
    pub async fn is_authorized(&self, wallet: Address, address: Address) -> Result<bool> {
        Ok(self.authorization(wallet, address).await?.can_sign)
    }
}

fn check_key(session_key: Address) -> Result<()> {
    if session_key.is_zero() {
        return Err(PipelineError::InvalidParameters("session key cannot be the zero address".to_string()));
    }
    Ok(())
}
