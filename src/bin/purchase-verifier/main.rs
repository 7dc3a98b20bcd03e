//! purchase-verifier CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use purchase_verifier::verify::normalize_email;
use purchase_verifier::{
    RedemptionLedger, Reply, Requester, ServiceBuilder, VerifierConfig, VerifyRequest,
};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_tracing(&config)?;
    info!("purchase-verifier v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Verify {
            requester_id,
            requester_name,
            email,
            username,
            channel_id,
        } => {
            let service = ServiceBuilder::new(config.clone()).build()?;

            // Stand-in for the report channel and admin DMs.
            let mut events = service.subscribe_events();
            let admins = config.discord.admin_ids.clone();
            let report_channel = service.report_channel_id();
            let notifier = tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => {
                            if let Some(channel) = report_channel {
                                let report = event.report();
                                info!(channel, fields = ?report.fields, "{}", report.description);
                            }
                            info!(?admins, "{}", event.admin_message());
                        }
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let reply = service
                .handle(VerifyRequest {
                    requester: Requester {
                        id: requester_id,
                        name: requester_name,
                    },
                    channel_id: channel_id
                        .or(config.discord.verify_channel_id)
                        .unwrap_or_default(),
                    email,
                    username,
                })
                .await;

            println!("{}", reply.message());
            if let Reply::Verified { roles } = &reply {
                for role in roles {
                    println!("grant role {role}");
                }
            }

            service.drain().await;
            drop(service);
            notifier.await?;
        }
        Command::Show { email } => {
            let ledger = RedemptionLedger::open(config.ledger_dir())?;
            match ledger.get(&email) {
                Some(record) => {
                    println!("email:     {}", record.email);
                    println!("requester: {}", record.requester_id);
                    println!("updated:   {}", record.updated_at.to_rfc3339());
                    for item in &record.redeemed_items {
                        println!("item:      {item}");
                    }
                }
                None => println!("No redemption recorded for {}", normalize_email(&email)),
            }
        }
        Command::Export => {
            let ledger = RedemptionLedger::open(config.ledger_dir())?;
            let path = config.snapshot_path();
            ledger.export_snapshot(&path).await?;
            println!("Exported {} record(s) to {}", ledger.len(), path.display());
        }
        Command::InitConfig { path } => {
            config.to_file(&path)?;
            println!("Wrote configuration to {}", path.display());
        }
    }

    Ok(())
}

fn init_tracing(config: &VerifierConfig) -> color_eyre::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let log_path = config.log_path();
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .with(filter)
        .init();

    Ok(())
}
