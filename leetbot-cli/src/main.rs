//! CLI entry point for leetbot

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use leetbot_agent::{ChatService, ChatSettings};
use leetbot_core::config::validate::validate_config;
use leetbot_core::config::{Config, ConfigLoader, StoreBackend};
use leetbot_core::logging::init_logging;
use leetbot_core::session::{open_store, HistoryManager};
use leetbot_manager::{run_server, AppState};
use leetbot_providers::{LLMProvider, OpenAICompatClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "leetbot")]
#[command(about = "A DSA teaching assistant that answers with hints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Session store backend (memory, file, sqlite, redis)
        #[arg(long)]
        store: Option<StoreBackend>,
    },
    /// Send one message and print the hint
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,
        /// Session id for conversation continuity
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Print the stored conversation of a session
    History { session_id: String },
    /// Clear the stored conversation of a session
    Clear { session_id: String },
    /// Show configuration and store health
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    let mut config = config_loader.load()?;
    if let Commands::Serve { host, port, store } = &cli.command {
        apply_serve_overrides(&mut config, host.clone(), *port, *store)?;
    }

    let _log_guard = init_logging(&config.logging);

    match cli.command {
        Commands::Serve { .. } => {
            info!("Starting server");
            run_serve(config).await?;
        }
        Commands::Chat { message, session } => {
            run_chat(&config, &message, session).await?;
        }
        Commands::History { session_id } => {
            run_history(&config, &session_id).await?;
        }
        Commands::Clear { session_id } => {
            run_clear(&config, &session_id).await?;
        }
        Commands::Status => {
            run_status(&config_loader, &config).await?;
        }
    }

    Ok(())
}

/// Command-line flags win over file and environment configuration
fn apply_serve_overrides(
    config: &mut Config,
    host: Option<String>,
    port: Option<u16>,
    store: Option<StoreBackend>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(store) = store {
        config.store.backend = store;
    }
    validate_config(config)?;
    Ok(())
}

async fn build_service(config: &Config) -> Result<Arc<ChatService>> {
    let store = open_store(&config.store).await?;
    let provider = OpenAICompatClient::from_config(&config.provider)?;
    info!(
        store = store.backend(),
        provider = %config.provider.name,
        api_base = provider.api_base(),
        model = %provider.get_default_model(),
        "Chat service ready"
    );

    let history = HistoryManager::new(store, config.chat.system_prompt.clone());
    Ok(Arc::new(ChatService::new(
        history,
        Arc::new(provider),
        ChatSettings::from_config(config),
    )))
}

async fn run_serve(config: Config) -> Result<()> {
    if config.provider.api_key.trim().is_empty() {
        warn!(provider = %config.provider.name, "No API key configured; provider calls will fail");
    }
    let chat = build_service(&config).await?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    run_server(
        AppState::new(chat),
        &config.server.host,
        config.server.port,
        shutdown,
    )
    .await
}

async fn run_chat(config: &Config, message: &str, session: Option<String>) -> Result<()> {
    let chat = build_service(config).await?;
    let reply = chat.chat(message, session.as_deref()).await?;

    if let Some(warning) = &reply.warning {
        println!("{} {}", style("warning:").yellow(), warning);
    }
    println!("{}", reply.assistant_response);
    println!();
    println!("{} {}", style("session:").dim(), reply.session_id);
    if config.store.backend == StoreBackend::Memory {
        println!(
            "{}",
            style("The memory store does not outlive this process; use --store file or sqlite with `serve` to keep history.").dim()
        );
    }
    Ok(())
}

async fn run_history(config: &Config, session_id: &str) -> Result<()> {
    let store = open_store(&config.store).await?;
    let history = HistoryManager::new(store, config.chat.system_prompt.clone());

    match history.get_history(session_id).await {
        Ok(history) => {
            if let Some(reason) = &history.degraded {
                println!("{} stored history is unreadable: {}", style("warning:").yellow(), reason);
            }
            for turn in &history.turns {
                println!(
                    "{} {}: {}",
                    style(turn.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
                    style(turn.role).bold(),
                    turn.content
                );
            }
            Ok(())
        }
        Err(leetbot_core::Error::NotFound(_)) => {
            println!("No history found for session {}", session_id);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_clear(config: &Config, session_id: &str) -> Result<()> {
    let store = open_store(&config.store).await?;
    HistoryManager::new(store, config.chat.system_prompt.clone())
        .clear_session(session_id)
        .await?;
    println!("Conversation history cleared");
    Ok(())
}

async fn run_status(loader: &ConfigLoader, config: &Config) -> Result<()> {
    println!("{}", style("LeetBot Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config file: {}", loader.config_path().display());
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Context window: {} turns", config.chat.window_size);
    println!();

    println!("{}", style("Provider:").bold());
    println!("  Name: {}", config.provider.name);
    println!("  Model: {}", config.provider.model);
    let key_status = if config.provider.api_key.trim().is_empty() {
        style("not configured").red()
    } else {
        style("configured").green()
    };
    println!("  API key: {}", key_status);
    println!();

    println!("{}", style("Session store:").bold());
    println!("  Backend: {}", config.store.backend);
    let health = match open_store(&config.store).await {
        Ok(store) => store.health_check().await,
        Err(e) => Err(e),
    };
    match health {
        Ok(()) => println!("  Health: {}", style("healthy").green()),
        Err(e) => println!("  Health: {} ({})", style("unhealthy").red(), e),
    }

    Ok(())
}
