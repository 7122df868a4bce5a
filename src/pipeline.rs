// src/pipeline.rs
use std::sync::Arc;

use ethers::types::{Address, H256};
use tracing::{debug, info, warn};

use crate::builder::UserOperationBuilder;
use crate::bundler::BundlerApi;
use crate::chain::WalletReader;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::hash::user_op_hash;
use crate::signer::OperationSigner;
use crate::types::{Action, OperationStatus, SubmittedOperation, UserOperation, UserOperationReceipt};

/// Build, hash, sign and submit, in that order, for one wallet action at a time.
///
/// A failure at any stage ends the attempt. Nothing is retried and a stale operation is
/// never resubmitted; the caller starts over with `send` and gets a fresh nonce.
pub struct UserOpPipeline {
    builder: UserOperationBuilder,
    reader: Arc<dyn WalletReader>,
    bundler: Arc<dyn BundlerApi>,
    config: PipelineConfig,
}

impl UserOpPipeline {
    pub fn new(reader: Arc<dyn WalletReader>, bundler: Arc<dyn BundlerApi>, config: PipelineConfig) -> Self {
        Self {
            builder: UserOperationBuilder::new(reader.clone()),
            reader,
            bundler,
            config,
        }
    }

    pub fn reader(&self) -> &Arc<dyn WalletReader> {
        &self.reader
    }

    /// Digest for `op` under the configured EntryPoint and chain.
    pub fn hash(&self, op: &UserOperation) -> H256 {
        user_op_hash(op, self.config.entry_point, self.config.chain_id)
    }

    /// Builds and signs an operation without submitting it. Returns the signed operation and its digest.
    pub async fn prepare(
        &self,
        wallet: Address,
        action: Action,
        signer: &OperationSigner,
    ) -> Result<(UserOperation, H256)> {
        // 1. Build
        let op = self.builder.build(wallet, action).await?;

        // 2. Hash
        let hash = self.hash(&op);
        debug!("UserOperation {:?}/{} hashed to {:?}", op.sender, op.nonce, hash);
        if self.config.verify_hash_with_entry_point {
            self.verify_with_entry_point(&op, hash).await?;
        }

        // 3. Sign
        let signature = signer.sign_digest(hash)?;
        debug!("UserOperation {:?} signed by {:?}", hash, signer.address());

        Ok((op.with_signature(signature), hash))
    }

    /// Runs the whole pipeline and hands the signed operation to the bundler.
    pub async fn send(&self, wallet: Address, action: Action, signer: &OperationSigner) -> Result<SubmittedOperation> {
        let (op, hash) = self.prepare(wallet, action, signer).await?;

        // 4. Submit
        let user_op_hash = self.bundler.submit(&op, self.config.entry_point).await?;
        if user_op_hash != hash {
            warn!(
                "Bundler returned {:?} for UserOperation hashed locally as {:?}",
                user_op_hash, hash
            );
        }
        info!(
            "UserOperation {:?} submitted for {:?} with nonce {}",
            user_op_hash, op.sender, op.nonce
        );

        Ok(SubmittedOperation {
            user_op_hash,
            sender: op.sender,
            nonce: op.nonce,
        })
    }

    /// Single receipt lookup. `None` while pending.
    pub async fn receipt(&self, user_op_hash: H256) -> Result<Option<UserOperationReceipt>> {
        self.bundler.get_receipt(user_op_hash).await
    }

    pub async fn status(&self, user_op_hash: H256) -> Result<OperationStatus> {
        Ok(self.receipt(user_op_hash).await?.into())
    }

    async fn verify_with_entry_point(&self, op: &UserOperation, local: H256) -> Result<()> {
        let entry_point = self
            .reader
            .entry_point_user_op_hash(op, self.config.entry_point)
            .await?;
        if entry_point != local {
            warn!(
                "EntryPoint hash {:?} disagrees with local hash {:?} for {:?}",
                entry_point, local, op.sender
            );
            return Err(PipelineError::HashMismatch { local, entry_point });
        }
        Ok(())
    }
}
