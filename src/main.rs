use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use router::{AppState, create_router};
use std::net::SocketAddr;

#[derive(Parser)]
#[command(name = "pressroom")]
#[command(about = "Pressroom - multi-tenant publishing backend")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, help = "HTTP API server port, overrides http.port")]
    port: Option<u16>,

    #[arg(long, help = "Bind address, overrides http.bind")]
    bind: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for Commands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let mut config = utils::load_config(cli.common.config.as_ref())?;
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if let Some(bind) = cli.bind {
        config.http.bind = bind;
    }

    let command = cli.command.unwrap_or_default();
    let Commands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config).await? {
        return Ok(());
    }

    utils::validate_config(&config)?;
    log::info!("Starting Pressroom");

    let bind_ip = config
        .http
        .bind
        .parse::<std::net::IpAddr>()
        .context("Invalid bind address")?;
    let http_addr = SocketAddr::new(bind_ip, config.http.port);

    let state = AppState::from_config(config)
        .await
        .context("Failed to initialize application state")?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server on {http_addr}"))?;
    log::info!("HTTP API server listening on {http_addr}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for ctrl+c signal: {e}");
            }
            log::info!("Shutting down HTTP server gracefully");
        })
        .await
        .context("HTTP server error")?;

    log::info!("Pressroom stopped");
    Ok(())
}
