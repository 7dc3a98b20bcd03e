//! Configuration for purchase-verifier.

use crate::lookup::PayPalConfig;
use crate::verify::{ItemId, RoleId, RoleMapping};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Root directory for the ledger, snapshot and log file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log file (defaults to `verifybot.log` in the data directory).
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// PayPal account settings.
    #[serde(default)]
    pub paypal: PayPalSettings,

    /// Purchased item id to the role ids it grants.
    #[serde(default)]
    pub roles: HashMap<ItemId, Vec<RoleId>>,

    /// Discord server settings.
    #[serde(default)]
    pub discord: DiscordConfig,
}

/// PayPal account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayPalSettings {
    /// REST app client id.
    #[serde(default)]
    pub client_id: String,

    /// REST app client secret.
    #[serde(default)]
    pub client_secret: String,

    /// Use the sandbox environment.
    #[serde(default)]
    pub sandbox: bool,

    /// How many days of history to search.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Timeout for each provider request, in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Number of date windows fetched at once.
    #[serde(default = "default_concurrent_windows")]
    pub max_concurrent_windows: usize,
}

/// Discord server settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Only accept claims submitted in this channel (any channel if unset).
    #[serde(default)]
    pub verify_channel_id: Option<u64>,

    /// Channel receiving verification reports.
    #[serde(default)]
    pub report_channel_id: Option<u64>,

    /// Members with this role may post in the verify channel; other
    /// messages there are removed.
    #[serde(default)]
    pub admin_role_id: Option<RoleId>,

    /// Members notified directly about every verification.
    #[serde(default)]
    pub admin_ids: Vec<u64>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            log_file: None,
            paypal: PayPalSettings::default(),
            roles: HashMap::new(),
            discord: DiscordConfig::default(),
        }
    }
}

impl Default for PayPalSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            sandbox: false,
            lookback_days: default_lookback_days(),
            query_timeout_secs: default_query_timeout(),
            max_concurrent_windows: default_concurrent_windows(),
        }
    }
}

impl From<&PayPalSettings> for PayPalConfig {
    fn from(settings: &PayPalSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            sandbox: settings.sandbox,
            lookback_days: settings.lookback_days,
            query_timeout: Duration::from_secs(settings.query_timeout_secs),
            max_concurrent_windows: settings.max_concurrent_windows,
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "purchase-verifier")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_lookback_days() -> u32 {
    3 * 365
}

const fn default_query_timeout() -> u64 {
    30
}

const fn default_concurrent_windows() -> usize {
    4
}

impl VerifierConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory holding ledger record files.
    #[must_use]
    pub fn ledger_dir(&self) -> PathBuf {
        self.data_dir.join("ledger")
    }

    /// Path of the exported ledger snapshot.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("redemptions.json")
    }

    /// Path of the log file.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.data_dir.join("verifybot.log"))
    }

    /// Build the role mapping table.
    #[must_use]
    pub fn role_mapping(&self) -> RoleMapping {
        RoleMapping::from(self.roles.clone())
    }
}
