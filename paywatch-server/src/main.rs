//! Paywatch Server
//!
//! Watches EVM addresses for incoming payments and notifies a crediting
//! ledger once they are confirmed.

mod api;
mod config;
mod server;
mod shutdown;
mod state;
mod webhook;

use clap::{Parser, Subcommand};
use config::{ConfigLoader, LoadedConfig};
use paywatch_core::chain::{ChainClient, JsonRpcClient};
use paywatch_core::config::ConfigStore;
use paywatch_core::events::transfer_event_channel;
use paywatch_core::processors::{ManualVerifier, MonitorSupervisor, json_rpc_factory};
use paywatch_sdk::objects::admin::AdminVerifyResponse;
use server::{build_router, run_server};
use shutdown::{ReloadTargets, spawn_config_reload_handler};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use webhook::WebhookSender;

/// Paywatch - on-chain payment confirmation monitor
#[derive(Parser, Debug)]
#[command(name = "paywatch-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(
        short,
        long,
        env = "PAYWATCH_CONFIG",
        default_value = "./paywatch.toml",
        global = true
    )]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long, global = true)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitors, webhook delivery and the admin API (default)
    Serve,
    /// Look one transaction up on chain and print its status as JSON
    Verify {
        /// Name of the configured watch
        #[arg(long)]
        watch: String,
        /// Transaction hash (0x-prefixed)
        tx_hash: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config_loader, loaded_config).await,
        Command::Verify { watch, tx_hash } => verify(loaded_config, &watch, &tx_hash).await,
    }
}

async fn serve(config_loader: Arc<ConfigLoader>, loaded_config: LoadedConfig) -> anyhow::Result<()> {
    tracing::info!("Starting paywatch-server v{}", env!("CARGO_PKG_VERSION"));

    let listen_addr = loaded_config.server.listen;
    let watches = ConfigStore::new(loaded_config.watches);
    let admin = ConfigStore::new(loaded_config.admin);
    let ledger = ConfigStore::new(loaded_config.ledger);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = transfer_event_channel();

    // Monitors feed the webhook queue; the supervisor reconciles them on reload.
    let supervisor =
        Arc::new(MonitorSupervisor::new(json_rpc_factory()).with_event_sink(events_tx));
    let supervisor_handle = {
        let supervisor = supervisor.clone();
        let store = watches.clone();
        let watcher = watches.subscribe();
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { supervisor.run(shutdown_rx, store, watcher).await })
    };

    let webhook_handle =
        tokio::spawn(WebhookSender::new(ledger.clone()).run(events_rx, shutdown_rx));

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(
        config_loader,
        ReloadTargets {
            watches,
            admin: admin.clone(),
            ledger,
        },
        listen_addr,
    );

    let router = build_router(AppState::new(supervisor, admin));

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop reloads first so no monitor is started while shutting down.
    reload_notify.notify_one();
    let _ = shutdown_tx.send(true);
    if let Err(e) = supervisor_handle.await {
        tracing::error!(error = %e, "MonitorSupervisor task failed");
    }
    if let Err(e) = webhook_handle.await {
        tracing::error!(error = %e, "WebhookSender task failed");
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

async fn verify(loaded_config: LoadedConfig, watch: &str, tx_hash: &str) -> anyhow::Result<()> {
    let Some(config) = loaded_config
        .watches
        .into_iter()
        .find(|config| config.name == watch)
    else {
        anyhow::bail!("unknown watch {watch}");
    };

    let client: Arc<dyn ChainClient> = Arc::new(JsonRpcClient::new(config.endpoint.clone()));
    let required = config.required_confirmations;
    let name = config.name.clone();
    let verifier = ManualVerifier::new(Arc::new(config), client);

    let transfer = verifier.verify(tx_hash).await?;
    let response = AdminVerifyResponse {
        watch: name,
        tx_hash: tx_hash.to_string(),
        transfer: transfer.map(|t| t.to_payload(required)),
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
///
/// Logs go to stderr so `verify` output on stdout stays machine readable.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,paywatch_core=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
