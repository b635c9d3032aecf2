use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use chat_relay::{
    cli::{Cli, Command},
    client,
    config::RelayConfig,
    server::RelayServer,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let config = RelayConfig::from(args);
            let server = RelayServer::bind(&config).await?;
            info!("relay tcp listening on {}", server.tcp_addr()?);
            info!("relay websocket listening on {}", server.ws_addr()?);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("relay exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Client(args) => client::run(args).await?,
    }

    Ok(())
}
