// src/main.rs
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use jsonrpsee::server::{ServerBuilder, ServerHandle};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use session_wallet::bundler::BundlerClient;
use session_wallet::chain::ChainClient;
use session_wallet::config::Args;
use session_wallet::pipeline::UserOpPipeline;
use session_wallet::rpc::{WalletRpcImpl, WalletRpcServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.pipeline_config();
    info!(
        "Using EntryPoint {:?} on chain {} via bundler {}",
        config.entry_point, config.chain_id, config.bundler_url
    );

    let chain = ChainClient::new(&config)?;
    match chain.chain_id().await {
        Ok(id) if id != config.chain_id => warn!(
            "Node reports chain {} but {} is configured; signatures will not verify",
            id, config.chain_id
        ),
        Ok(_) => {}
        Err(e) => warn!("Could not read chain id from node: {}", e),
    }

    let bundler = BundlerClient::new(&config)?;
    match bundler.supported_entry_points().await {
        Ok(entry_points) if !entry_points.contains(&config.entry_point) => warn!(
            "Bundler does not list EntryPoint {:?} (supports {:?})",
            config.entry_point, entry_points
        ),
        Ok(_) => {}
        Err(e) => warn!("Could not read supported EntryPoints from bundler: {}", e),
    }

    let pipeline = UserOpPipeline::new(Arc::new(chain), Arc::new(bundler), config);
    let wallet_rpc = WalletRpcImpl::new(Arc::new(pipeline));

    info!("Starting session wallet RPC server on {}", args.rpc_server_addr);
    let server_handle = start_server(args.rpc_server_addr, wallet_rpc).await?;

    // Keep the server running until Ctrl+C is pressed
    tokio::signal::ctrl_c().await?;
    server_handle.stop()?;
    info!("Server stopped");

    Ok(())
}

async fn start_server(server_addr: SocketAddr, wallet_rpc: WalletRpcImpl) -> anyhow::Result<ServerHandle> {
    let server = ServerBuilder::default().build(server_addr).await?;
    Ok(server.start(wallet_rpc.into_rpc()))
}
