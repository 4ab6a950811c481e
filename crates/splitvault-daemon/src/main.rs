//! splitvault-daemon: the revenue split ledger daemon.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! daemon via JSON-RPC over a Unix socket. All ledger mutations are
//! serialized behind one lock and persisted to SQLite before they are
//! acknowledged.

mod commands;
mod config;
mod events;
mod rpc;

use std::sync::Arc;

use splitvault_ledger::engine::{EngineConfig, SplitEngine};
use splitvault_ledger::sandbox::{SandboxAllowances, SandboxRail, SandboxScheduler};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::events::EventBus;
use crate::rpc::RpcServer;

/// The engine wired to the in-memory gateways.
pub type SandboxEngine = SplitEngine<SandboxRail, SandboxScheduler, SandboxAllowances>;

/// Daemon-wide shared state.
///
/// Lock order: `engine` before `db`.
pub struct DaemonState {
    /// The ledger engine. Holding this lock is the global serialization point.
    pub engine: Mutex<SandboxEngine>,
    /// Database connection.
    pub db: Arc<Mutex<rusqlite::Connection>>,
    /// Configuration.
    pub config: DaemonConfig,
    /// Live notifications for `subscribe_events` connections.
    pub event_bus: EventBus,
}

impl DaemonState {
    /// Restore the engine from the database and assemble the daemon state.
    pub fn build(config: DaemonConfig, conn: rusqlite::Connection) -> anyhow::Result<Self> {
        let engine_config = EngineConfig {
            custodian: config.custodian()?,
            max_recipients: config.ledger.max_recipients,
        };
        let snapshot = splitvault_db::queries::state::load_snapshot(&conn)?;
        let mut scheduler = SandboxScheduler::new(config.initial_schedule_status()?);
        scheduler.retire_handles(snapshot.reservations.iter().map(|r| r.handle));
        let engine = SplitEngine::restore(
            engine_config,
            snapshot,
            SandboxRail::new(),
            scheduler,
            SandboxAllowances::new(),
        )?;

        Ok(Self {
            engine: Mutex::new(engine),
            db: Arc::new(Mutex::new(conn)),
            event_bus: EventBus::new(config.rpc.event_buffer),
            config,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_directive().parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "splitvault daemon starting");

    if !config.sandbox.enabled {
        anyhow::bail!("no external gateway backend is available; set sandbox.enabled = true");
    }

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let db_path = data_dir.join(splitvault_db::DB_FILE_NAME);
    let conn = splitvault_db::open(&db_path)?;
    let socket_path = data_dir.join(&config.rpc.socket_name);
    let state = Arc::new(DaemonState::build(config, conn)?);

    {
        let engine = state.engine.lock().await;
        info!(
            custodian = %engine.config().custodian,
            db = %db_path.display(),
            "ledger restored"
        );
    }

    let rpc_server = RpcServer::new(Arc::clone(&state), socket_path.clone());

    state.event_bus.emit(events::Event::daemon(
        "daemon_started",
        serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
    ));

    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "RPC server stopped");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
        }
    }

    let _ = std::fs::remove_file(&socket_path);

    info!(events = state.event_bus.sequence(), "daemon stopped");
    Ok(())
}
