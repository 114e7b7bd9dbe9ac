use clap::{Parser, Subcommand};
use muster_campaigns::{HandlerRegistry, Orchestrator};
use muster_core::config::MusterConfig;
use muster_core::seal::Sealer;
use muster_core::derive_agent_id;
use muster_gateway::GatewayServer;
use muster_queue::{
    spawn_sweep, CommandQueue, CommandStore, FileCommandStore, InMemoryCommandStore,
};
use muster_registry::{FileRegistryStore, InMemoryRegistryStore, Registry, RegistryStore};
use muster_vault::{FileVaultStore, InMemoryVaultStore, Vault, VaultStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "muster", about = "Muster — fleet coordination controller")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "muster.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dispatch gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Derive the stable agent id for a host
    AgentId {
        /// Hostname the agent reports
        hostname: String,
        /// Hardware token (MAC address or machine id)
        machine_token: String,
    },
    /// Generate a base64 sealing key for muster.toml
    SealKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { host, port } => {
            // Load config
            let config_str = tokio::fs::read_to_string(&cli.config).await.map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    cli.config.display(),
                    e
                )
            })?;
            let config = MusterConfig::from_toml_str(&config_str)?;

            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            let seal_key = config.seal_key.as_deref().ok_or_else(|| {
                anyhow::anyhow!(
                    "seal_key is not set in '{}'; generate one with `muster seal-key`",
                    cli.config.display()
                )
            })?;
            let sealer = Sealer::from_base64(seal_key)?;

            // Stores: file-backed under data_dir, in-memory otherwise
            let (registry_store, command_store, vault_store): (
                Arc<dyn RegistryStore>,
                Arc<dyn CommandStore>,
                Arc<dyn VaultStore>,
            ) = match &config.data_dir {
                Some(dir) => {
                    info!(data_dir = %dir.display(), "Using file-backed stores");
                    (
                        Arc::new(FileRegistryStore::new(dir.join("agents")).await?),
                        Arc::new(FileCommandStore::new(dir.join("commands")).await?),
                        Arc::new(FileVaultStore::new(dir.join("artifacts")).await?),
                    )
                }
                None => {
                    warn!("data_dir not set; fleet state will not survive a restart");
                    (
                        Arc::new(InMemoryRegistryStore::new()),
                        Arc::new(InMemoryCommandStore::new()),
                        Arc::new(InMemoryVaultStore::new()),
                    )
                }
            };

            let registry = Arc::new(Registry::new(
                registry_store,
                config.fleet.liveness_threshold(),
            ));
            let queue = Arc::new(CommandQueue::new(
                command_store,
                Arc::clone(&registry),
                sealer.clone(),
                config.fleet.command_timeout(),
            ));
            let vault = Arc::new(Vault::new(vault_store, Arc::clone(&registry), sealer));
            let orchestrator = Arc::new(Orchestrator::new(
                HandlerRegistry::with_simulators(),
                Arc::clone(&registry),
                config.orchestrator.worker_ceiling,
                config.orchestrator.campaign_cycle(),
            ));
            info!(
                worker_ceiling = config.orchestrator.worker_ceiling,
                campaign_cycle_secs = config.orchestrator.campaign_cycle_secs,
                "Orchestrator ready"
            );

            let shutdown = CancellationToken::new();
            let sweep_handle = spawn_sweep(
                Arc::clone(&queue),
                config.fleet.sweep_interval(),
                shutdown.child_token(),
            );

            let app = GatewayServer::build(
                Arc::clone(&registry),
                Arc::clone(&queue),
                Arc::clone(&vault),
                Arc::clone(&orchestrator),
            );

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Muster gateway listening on {}", addr);

            let signal_shutdown = shutdown.clone();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                    }
                    info!("Shutdown signal received");
                    signal_shutdown.cancel();
                })
                .await?;

            // Drain background work before exiting
            orchestrator.shutdown().await;
            let _ = sweep_handle.await;
            info!("Muster gateway stopped");
        }
        Commands::AgentId {
            hostname,
            machine_token,
        } => {
            println!("{}", derive_agent_id(&hostname, &machine_token));
        }
        Commands::SealKey => {
            println!("{}", Sealer::generate_key_base64());
        }
    }

    Ok(())
}
