//! Command-line interface definition.

use clap::{Parser, Subcommand};
use purchase_verifier::VerifierConfig;
use std::path::PathBuf;

/// Verify plugin purchases and redeem them for chat server roles.
#[derive(Parser, Debug)]
#[command(name = "purchase-verifier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short, env = "VERIFIER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Root directory for the ledger, snapshot and log file.
    #[arg(long, env = "VERIFIER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// PayPal REST app client id.
    #[arg(long, env = "PAYPAL_CLIENT_ID")]
    pub paypal_client_id: Option<String>,

    /// PayPal REST app client secret.
    #[arg(long, env = "PAYPAL_CLIENT_SECRET", hide_env_values = true)]
    pub paypal_client_secret: Option<String>,

    /// Use the PayPal sandbox.
    #[arg(long)]
    pub sandbox: bool,

    /// Log level.
    #[arg(long)]
    pub log_level: Option<String>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Verify a purchase claim and print the reply.
    Verify {
        /// Chat user id of the claimant.
        #[arg(long)]
        requester_id: u64,
        /// Display name of the claimant.
        #[arg(long, default_value = "cli")]
        requester_name: String,
        /// Email the purchase was paid with.
        #[arg(long)]
        email: String,
        /// Marketplace username.
        #[arg(long)]
        username: String,
        /// Channel the claim was made in (defaults to the verify channel).
        #[arg(long)]
        channel_id: Option<u64>,
    },
    /// Show the ledger record for an email.
    Show {
        /// Email to look up.
        #[arg(long)]
        email: String,
    },
    /// Export the ledger snapshot.
    Export,
    /// Write the effective configuration to a file.
    InitConfig {
        /// Destination path.
        #[arg(long)]
        path: PathBuf,
    },
}

impl Cli {
    /// Build the effective configuration: file (or defaults), then CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn load_config(&self) -> color_eyre::Result<VerifierConfig> {
        let mut config = if let Some(ref path) = self.config {
            VerifierConfig::from_file(path)?
        } else {
            VerifierConfig::default()
        };

        if let Some(ref data_dir) = self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(ref id) = self.paypal_client_id {
            config.paypal.client_id = id.clone();
        }
        if let Some(ref secret) = self.paypal_client_secret {
            config.paypal.client_secret = secret.clone();
        }
        if self.sandbox {
            config.paypal.sandbox = true;
        }
        if let Some(ref level) = self.log_level {
            config.log_level = level.clone();
        }

        Ok(config)
    }
}
