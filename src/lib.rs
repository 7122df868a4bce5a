// src/lib.rs
// ERC-4337 UserOperation pipeline for session-key smart wallets.

pub mod builder;
pub mod bundler;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod hash;
pub mod pipeline;
pub mod rpc;
pub mod session;
pub mod signer;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{PipelineError, Result};
pub use types::{Action, UserOperation};
