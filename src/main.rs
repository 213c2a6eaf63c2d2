//! fedround node
//!
//! Entry point for the `fedround-node` binary. Serves the peer protocol,
//! runs the configured number of training rounds against the federation,
//! and exits.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use fedround::config::{self, NodeConfig};
use fedround::error::{Error, Result};
use fedround::logging::{self, LogGuards};
use fedround::peer::{PeerRegistry, PeerServer, PeerService, Sender, TcpTransport};
use fedround::round::{
    ChecksumObserver, RoundCoordinator, RoundGate, RunSummary, SnapshotObserver,
};
use fedround::training::SyntheticTrainer;
use fedround::types::FIRST_ROUND;
use fedround::version;

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN);
            handle_config_command(subcommand)
        }
        Commands::Run { config, rounds } => run(config.as_deref(), rounds, cli.verbose, cli.quiet),
    };

    if let Err(e) = outcome {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

/// Load configuration, set up logging, and drive the node to completion
fn run(config_path: Option<&str>, rounds: Option<u64>, verbose: u8, quiet: bool) -> Result<()> {
    let mut config = NodeConfig::load(config_path)?;
    if let Some(rounds) = rounds {
        config.round.rounds = rounds;
        config.validate()?;
    }

    // The guards must be kept alive for the lifetime of the program
    let _log_guards: LogGuards = logging::init_logging(&config.logging, verbose, quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        "Starting fedround node"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(num_cpus::get().clamp(2, 8))
        .thread_name("fedround-node")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    let summary = runtime.block_on(async_node_main(config))?;
    info!(
        rounds = summary.rounds_completed(),
        next_round = summary.next_round,
        "Node finished"
    );
    Ok(())
}

/// Async node main: serve, probe, run rounds, shut down
async fn async_node_main(config: NodeConfig) -> Result<RunSummary> {
    let registry = PeerRegistry::from_config(&config)?;
    let local = registry.local().clone();

    let gate = Arc::new(RoundGate::new(FIRST_ROUND, registry.peer_count()));
    let service = Arc::new(PeerService::new(local.name.clone(), gate.clone()));
    let server = PeerServer::start(&config.node.listen_addr, service).await?;

    let sender_config = config.sender.sender_config();
    let transport = Arc::new(TcpTransport::new(sender_config.attempt_timeout));

    // Startup probe is informational; sends retry on their own
    let serving = registry.probe(transport.as_ref()).await;
    info!(
        reachable = serving.len(),
        peers = registry.peer_count(),
        "{}/{} peers reachable",
        serving.len(),
        registry.peer_count()
    );
    for name in &serving {
        if let Some(peer) = registry.get(name) {
            debug!(peer = %name, latency_ms = ?peer.latency_ms, "Peer answered health check");
        }
    }

    let sender = Sender::new(transport, sender_config, local.clone());
    let trainer = Arc::new(SyntheticTrainer::from_settings(&local.name, &config.training));

    let mut coordinator = RoundCoordinator::new(
        gate,
        sender,
        registry.others(),
        trainer,
        config.round.coordinator_config(),
    );
    if config.storage.checksums {
        coordinator = coordinator.with_observer(Arc::new(ChecksumObserver));
    }
    if config.storage.save_snapshots {
        let observer = SnapshotObserver::new(config.data_dir());
        info!(dir = %observer.dir().display(), "Saving round snapshots");
        coordinator = coordinator.with_observer(Arc::new(observer));
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, cancelling");
                let _ = cancel_tx.send(true);
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });

    let outcome = coordinator.run(cancel_rx).await;

    // Keep serving through one cooldown so slower peers can finish the last round
    if outcome.is_ok() {
        tokio::time::sleep(Duration::from_millis(config.round.cooldown_ms)).await;
    }
    server.shutdown().await;

    outcome
}

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = NodeConfig::load(config.as_deref())?;
            println!("{}", cfg.to_toml()?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            NodeConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
