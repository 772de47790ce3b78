use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use herald_channels::{MessageBus, TelegramChannel};
use herald_core::{AuthGate, Broadcaster, ChannelStore, ChatSender, CommandRouter, Publisher};
use herald_gateway::GatewayServer;
use herald_store::SqliteDocumentStore;

mod config;

use config::HeraldConfig;

/// Max control messages handled at once
const MAX_CONCURRENT_COMMANDS: usize = 10;

#[derive(Parser)]
#[command(name = "herald")]
#[command(version)]
#[command(about = "Herald: relay HTTP-published messages to Telegram channel followers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (HTTP gateway + Telegram webhook)
    Start,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,

    /// Inspect or edit stored channels
    Channels {
        #[command(subcommand)]
        action: ChannelsAction,
    },
}

#[derive(Subcommand)]
enum ChannelsAction {
    /// List every channel
    List,

    /// Show one channel
    Show { id: String },

    /// Delete a channel record
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins over --debug
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config).await,
        Commands::Start => cmd_start(&cli.config).await,
        Commands::Channels { action } => cmd_channels(&cli.config, action).await,
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        restrict_permissions(&config_path)?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Herald initialized at {}", config_dir.display());
    println!(
        "Edit {} to set the admin chat id and webhook domain.",
        config_path.display()
    );
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to chmod 600 {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> Result<()> {
    Ok(())
}

async fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = HeraldConfig::load(config_path)?;
    println!("{:#?}", cfg);
    Ok(())
}

fn open_store(cfg: &HeraldConfig) -> Result<ChannelStore> {
    let db_path = shellexpand(&cfg.store.db_path);
    let docs = SqliteDocumentStore::open(&db_path)
        .with_context(|| format!("Failed to open channel store at {}", db_path.display()))?;
    Ok(ChannelStore::new(Arc::new(docs)))
}

async fn cmd_start(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = HeraldConfig::load(config_path)?;
    cfg.validate_for_start()?;
    info!("Starting herald...");

    let cancel = CancellationToken::new();

    let store = open_store(&cfg)?;
    info!("Channel store initialized");

    // Telegram: verify the token, then point the webhook at us
    let telegram = TelegramChannel::new(&cfg.telegram.bot_token, cfg.api_url())?;
    telegram.connect().await?;
    let webhook_url = url::Url::parse(&cfg.webhook_url())
        .with_context(|| format!("Invalid webhook url: {}", cfg.webhook_url()))?;
    telegram
        .register_webhook(webhook_url, cfg.webhook_secret().as_deref())
        .await?;
    let chat: Arc<dyn ChatSender> = Arc::new(telegram);

    let broadcaster = Broadcaster::new(chat.clone());
    let publisher = Publisher::new(AuthGate::new(store.clone()), broadcaster.clone());
    let router = Arc::new(CommandRouter::new(
        store.clone(),
        broadcaster,
        cfg.admin.chat_id,
    ));
    info!("Admin chat id: {}", cfg.admin.chat_id);

    let bus = MessageBus::new(256, chat);

    let bind: SocketAddr = format!("{}:{}", cfg.gateway.bind, cfg.gateway.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid gateway address {}:{}",
                cfg.gateway.bind, cfg.gateway.port
            )
        })?;
    let gateway = GatewayServer::new(
        bind,
        &cfg.telegram.webhook_path,
        publisher,
        bus.inbound(),
        cfg.webhook_secret(),
    )?;
    let mut gateway_handle = gateway.spawn(cancel.clone());

    // Split bus into receiver + sender for concurrent use
    let (mut incoming_rx, bus_sender) = bus.split();

    // Semaphore to limit concurrent command handling
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_COMMANDS));

    let cancel_clone = cancel.clone();
    let main_loop = tokio::spawn(async move {
        let mut join_set = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel_clone.cancelled() => {
                    info!("Command loop shutting down");
                    break;
                }
                msg = incoming_rx.recv() => {
                    let Some(incoming) = msg else {
                        info!("Message bus closed");
                        break;
                    };
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let router = router.clone();
                    let sender = bus_sender.clone();
                    join_set.spawn(async move {
                        let _permit = permit;
                        let reply = router.handle(&incoming).await;
                        if let Err(e) = sender.send(reply).await {
                            error!("Failed to reply to {}: {:#}", incoming.sender_id, e);
                        }
                    });

                    // Reap finished handlers
                    while let Some(res) = join_set.try_join_next() {
                        if let Err(e) = res {
                            error!("Command task failed: {}", e);
                        }
                    }
                }
            }
        }

        // Drain remaining tasks for graceful shutdown
        while join_set.join_next().await.is_some() {}
    });

    println!("Herald is running on {}. Press Ctrl+C to stop.", bind);

    // Wait for shutdown signal, or for the gateway to die on its own
    let mut gateway_done = false;
    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            info!("Received Ctrl+C, shutting down...");
        }
        res = &mut gateway_handle => {
            gateway_done = true;
            match res {
                Ok(Ok(())) => warn!("Gateway stopped unexpectedly"),
                Ok(Err(e)) => error!("Gateway failed: {:#}", e),
                Err(e) => error!("Gateway task panicked: {}", e),
            }
        }
    }
    cancel.cancel();

    let _ = main_loop.await;
    if !gateway_done {
        match gateway_handle.await {
            Ok(Err(e)) => error!("Gateway shutdown error: {:#}", e),
            Err(e) => error!("Gateway task panicked: {}", e),
            Ok(Ok(())) => {}
        }
    }

    println!("Herald stopped.");
    Ok(())
}

async fn cmd_channels(config_path: &Option<PathBuf>, action: ChannelsAction) -> Result<()> {
    let cfg = HeraldConfig::load(config_path)?;
    let store = open_store(&cfg)?;

    match action {
        ChannelsAction::List => {
            let channels = store.list().await?;
            if channels.is_empty() {
                println!("No channels.");
            }
            for ch in channels {
                println!(
                    "{}\towner={}\tfollowers={}",
                    ch.id,
                    ch.owner,
                    ch.users.len()
                );
            }
        }
        ChannelsAction::Show { id } => match store.get(&id).await? {
            Some(ch) => {
                println!("id:         {}", ch.id);
                println!("owner:      {} ({})", ch.owner, ch.owner_name);
                println!("token:      {}", config::mask_secret(&ch.token));
                println!("followers:  {:?}", ch.users);
            }
            None => println!("Channel {} not found.", id),
        },
        ChannelsAction::Remove { id } => {
            if store.get(&id).await?.is_none() {
                println!("Channel {} not found.", id);
                return Ok(());
            }
            store.remove(&id).await?;
            println!("Removed channel {}.", id);
        }
    }
    Ok(())
}

// Utility: expand ~ in paths
fn shellexpand(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(s)
}
