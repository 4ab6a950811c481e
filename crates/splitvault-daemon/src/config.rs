//! Daemon settings, read from `config.toml` in the data directory.
//!
//! Every section and key is optional; anything missing takes its default.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use splitvault_crypto::blake3;
use splitvault_types::{AccountId, ScheduleStatus, DEFAULT_MAX_RECIPIENTS};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// In-memory gateway settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,
    /// JSON-RPC settings.
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Empty selects the platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Hex account holding custodial funds. Empty = derived default.
    #[serde(default)]
    pub custodian_account: String,
    /// Maximum recipients per split.
    #[serde(default = "default_max_recipients")]
    pub max_recipients: usize,
}

/// Sandbox gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Use in-memory gateways.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Status new schedules report: "pending" | "executed" | "deleted" | "invalid".
    #[serde(default = "default_schedule_status")]
    pub initial_schedule_status: String,
}

/// JSON-RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Socket file name inside the data directory.
    #[serde(default = "default_socket_name")]
    pub socket_name: String,
    /// Event bus capacity per subscriber.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Level for `splitvault*` targets; `RUST_LOG` can still add directives.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Enable `dev_*` RPC methods that manipulate the sandbox gateways.
    #[serde(default)]
    pub dev_commands: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_recipients() -> usize {
    DEFAULT_MAX_RECIPIENTS
}

fn default_schedule_status() -> String {
    "pending".to_string()
}

fn default_socket_name() -> String {
    "daemon.sock".to_string()
}

fn default_event_buffer() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            custodian_account: String::new(),
            max_recipients: default_max_recipients(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_schedule_status: default_schedule_status(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            socket_name: default_socket_name(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            dev_commands: false,
        }
    }
}

impl DaemonConfig {
    /// Read `config.toml` from the default data directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::default_data_dir().join("config.toml"))
    }

    /// Parse the file at `path`; a missing file means all defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("{}: {e}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// `storage.data_dir`, or the platform default when unset.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// The custodial account, parsed or derived.
    pub fn custodian(&self) -> anyhow::Result<AccountId> {
        if self.ledger.custodian_account.is_empty() {
            return Ok(AccountId(blake3::derive_key(
                blake3::contexts::CUSTODIAN_ACCOUNT,
                b"default",
            )));
        }
        self.ledger
            .custodian_account
            .parse()
            .map_err(|e| anyhow::anyhow!("ledger.custodian_account: {e}"))
    }

    /// Initial status for sandbox schedules.
    pub fn initial_schedule_status(&self) -> anyhow::Result<ScheduleStatus> {
        match ScheduleStatus::parse(&self.sandbox.initial_schedule_status) {
            Some(ScheduleStatus::Unknown) | None => Err(anyhow::anyhow!(
                "sandbox.initial_schedule_status: unsupported value '{}'",
                self.sandbox.initial_schedule_status
            )),
            Some(status) => Ok(status),
        }
    }

    /// Tracing directive for this crate family.
    pub fn log_directive(&self) -> String {
        format!("splitvault={}", self.advanced.log_level)
    }

    /// `$SPLITVAULT_DATA_DIR`, else a per-user directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("SPLITVAULT_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            home_fallback("Library/Application Support/Splitvault")
        }
        #[cfg(not(target_os = "macos"))]
        {
            home_fallback(".splitvault")
        }
    }
}

fn home_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/splitvault"))
}
