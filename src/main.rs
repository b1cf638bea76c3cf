use anyhow::Result;
use clap::Parser;
use dllbridge::config::Cli;
use dllbridge::{BridgeLibrary, Server, ServerConfig};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::resolve(Cli::parse())?;

    let library = BridgeLibrary::open(&config.library)?;
    info!("Loaded DLL: {}", config.library.display());

    let server = Server::bind(&config.listen_addr(), library).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}
