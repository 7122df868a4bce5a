// src/config.rs
use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use ethers::types::Address;

/// EntryPoint v0.6, deployed at the same address on every supported chain.
pub const DEFAULT_ENTRY_POINT: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";
/// Sepolia.
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Deployment settings shared by the chain and bundler clients. Built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub entry_point: Address,
    pub chain_id: u64,
    pub rpc_url: String,
    pub bundler_url: String,
    pub request_timeout: Duration,
    /// Ask the EntryPoint for its own userOpHash before signing and refuse to sign on mismatch.
    pub verify_hash_with_entry_point: bool,
}

impl PipelineConfig {
    pub fn new(entry_point: Address, chain_id: u64, rpc_url: impl Into<String>, bundler_url: impl Into<String>) -> Self {
        Self {
            entry_point,
            chain_id,
            rpc_url: rpc_url.into(),
            bundler_url: bundler_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            verify_hash_with_entry_point: false,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_hash_verification(mut self, enabled: bool) -> Self {
        self.verify_hash_with_entry_point = enabled;
        self
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(short, long, env = "RPC_SERVER_ADDR", default_value = "127.0.0.1:3000")]
    pub rpc_server_addr: SocketAddr,

    #[clap(short, long, env = "ETH_RPC_URL")]
    pub eth_rpc_url: String,

    #[clap(short, long, env = "BUNDLER_RPC_URL")]
    pub bundler_url: String,

    #[clap(long, env = "ENTRY_POINT", default_value = DEFAULT_ENTRY_POINT)]
    pub entry_point: Address,

    #[clap(short, long, env = "CHAIN_ID", default_value_t = DEFAULT_CHAIN_ID)]
    pub chain_id: u64,

    #[clap(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    #[clap(long, env = "VERIFY_HASH")]
    pub verify_hash: bool,

    #[clap(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: tracing::Level,
}

impl Args {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new(
            self.entry_point,
            self.chain_id,
            self.eth_rpc_url.clone(),
            self.bundler_url.clone(),
        )
        .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
        .with_hash_verification(self.verify_hash)
    }
}
