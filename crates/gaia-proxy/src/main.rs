//! Gaia proxy daemon - HTTP front end for the Gaia assistant service

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use gaia_proxy::config::Config;
use gaia_proxy::error::Result;
use gaia_proxy::logging::init_logging;
use gaia_proxy::server::ProxyServer;
use gaia_proxy::upstream::Orchestrator;

/// Gaia proxy - forwards questions to the Gaia assistant service
#[derive(Parser)]
#[command(name = "gaia-proxy")]
#[command(about = "HTTP proxy for the Gaia assistant service with retries and citation output")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the proxy server (default command)
    #[command(name = "serve")]
    Serve,

    /// Send one question upstream and print the answer
    Ask {
        /// Question text
        text: String,

        /// System prompt (defaults to the configured one)
        #[arg(long)]
        system: Option<String>,

        /// Assistant id (defaults to GAIA_ASSISTANT_ID)
        #[arg(long)]
        assistant: Option<String>,

        /// Document filter, e.g. a container id or glob
        #[arg(long)]
        filter: Option<String>,

        /// Call mode: assistant, ask, or bare
        #[arg(long)]
        mode: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    match cli.command {
        None | Some(Command::Serve) => serve(config).await,
        Some(Command::Ask {
            text,
            system,
            assistant,
            filter,
            mode,
        }) => {
            let orchestrator = Orchestrator::new(&config)?;
            let system_prompt = system.unwrap_or(config.server.default_system_prompt);
            let filter = filter.or(config.server.default_document_filter);
            let content = orchestrator
                .call_core_orchestrated(
                    &text,
                    &system_prompt,
                    assistant.as_deref(),
                    filter.as_deref(),
                    mode.as_deref(),
                )
                .await?;
            println!("{content}");
            Ok(())
        }
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::load(config_path.as_deref())?;
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting Gaia proxy daemon");
    tracing::info!(
        model = %config.upstream.model,
        max_retry = config.upstream.max_retry,
        timeout_secs = config.upstream.timeout_secs,
        session_token_limit = config.upstream.session_token_limit,
        "Upstream settings"
    );

    let orchestrator = Arc::new(Orchestrator::new(&config)?);
    let server = ProxyServer::new(orchestrator, config.server);
    server.serve().await
}
