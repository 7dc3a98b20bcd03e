//! Verification service - the command handler between the chat server and
//! the verification engine.

use crate::config::VerifierConfig;
use crate::error::Result;
use crate::event::{create_event_channel, VerifyEvent, VerifyEventsChannel, VerifyEventsSender};
use crate::lookup::{PayPalClient, PayPalConfig, PurchaseLookup};
use crate::verify::{normalize_email, RedemptionLedger, RoleId, VerificationEngine, VerifyError};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Member submitting a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    /// Chat platform user id.
    pub id: u64,
    /// Display name, used in logs.
    pub name: String,
}

/// A `/verify` command as received from the chat server.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    /// Who sent the command.
    pub requester: Requester,
    /// Channel the command was sent in.
    pub channel_id: u64,
    /// Claimed purchase email.
    pub email: String,
    /// Claimed marketplace username.
    pub username: String,
}

/// Reply shown to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Claim verified; these roles should be assigned.
    Verified {
        /// Roles to assign.
        roles: BTreeSet<RoleId>,
    },
    /// The requester already redeemed everything for this email.
    AlreadyVerifiedPurchases,
    /// The email is already bound to another member.
    AlreadyVerifiedEmail,
    /// Claim could not be verified.
    Failed,
    /// Command sent outside the verification channel.
    WrongChannel,
}

impl Reply {
    /// Message shown to the requester.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::Verified { .. } => "Successfully verified plugin purchase!",
            Self::AlreadyVerifiedPurchases => "You have already verified your purchase(s)!",
            Self::AlreadyVerifiedEmail => "Purchase already verified with this email!",
            Self::Failed => "Failed to verify plugin purchase, open a ticket.",
            Self::WrongChannel => {
                "This command is available only in channel dedicated for verification."
            }
        }
    }

    /// Returns true if roles should be assigned.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

impl From<VerifyError> for Reply {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::AlreadyVerifiedPurchases => Self::AlreadyVerifiedPurchases,
            VerifyError::AlreadyVerifiedEmail => Self::AlreadyVerifiedEmail,
            VerifyError::VerificationFailed => Self::Failed,
        }
    }
}

/// Builder for the production service (PayPal lookup, on-disk ledger).
pub struct ServiceBuilder {
    config: VerifierConfig,
}

impl ServiceBuilder {
    /// Create a new service builder with the given configuration.
    #[must_use]
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    /// Open the ledger and connect the lookup client.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or ledger cannot be opened, or
    /// if the PayPal client is misconfigured.
    pub fn build(self) -> Result<VerifierService<PayPalClient>> {
        std::fs::create_dir_all(&self.config.data_dir)?;

        let ledger = Arc::new(RedemptionLedger::open(self.config.ledger_dir())?);
        let lookup = PayPalClient::new(PayPalConfig::from(&self.config.paypal))?;
        let roles = self.config.role_mapping();
        if roles.is_empty() {
            warn!("No role mappings configured - verified purchases will grant nothing");
        }

        let engine = VerificationEngine::new(lookup, ledger, roles)
            .with_snapshot_path(self.config.snapshot_path());

        let discord = &self.config.discord;
        info!(
            "Verifier service ready ({} redeemed emails, verify channel {:?})",
            engine.ledger().len(),
            discord.verify_channel_id
        );

        Ok(VerifierService::new(engine, discord.verify_channel_id)
            .with_admin_role(discord.admin_role_id)
            .with_report_channel(discord.report_channel_id))
    }
}

/// Handles verification commands and publishes their outcomes.
pub struct VerifierService<L> {
    engine: Arc<VerificationEngine<L>>,
    verify_channel_id: Option<u64>,
    admin_role_id: Option<RoleId>,
    report_channel_id: Option<u64>,
    events_tx: VerifyEventsSender,
    flushes: Mutex<JoinSet<()>>,
}

impl<L: PurchaseLookup + 'static> VerifierService<L> {
    /// Wrap an engine. Commands outside `verify_channel_id` are refused when
    /// it is set.
    #[must_use]
    pub fn new(engine: VerificationEngine<L>, verify_channel_id: Option<u64>) -> Self {
        let (events_tx, _) = create_event_channel();
        Self {
            engine: Arc::new(engine),
            verify_channel_id,
            admin_role_id: None,
            report_channel_id: None,
            events_tx,
            flushes: Mutex::new(JoinSet::new()),
        }
    }

    /// Members holding `role` may talk in the verify channel.
    #[must_use]
    pub fn with_admin_role(mut self, role: Option<RoleId>) -> Self {
        self.admin_role_id = role;
        self
    }

    /// Channel that event subscribers should post reports to.
    #[must_use]
    pub fn with_report_channel(mut self, channel_id: Option<u64>) -> Self {
        self.report_channel_id = channel_id;
        self
    }

    /// Channel for verification reports, if configured.
    #[must_use]
    pub fn report_channel_id(&self) -> Option<u64> {
        self.report_channel_id
    }

    /// Returns true if a plain message should be removed from its channel.
    ///
    /// The verify channel only carries commands; messages there from members
    /// without the admin role are removed. Other channels are left alone.
    #[must_use]
    pub fn should_remove_message(&self, channel_id: u64, author_roles: &[RoleId]) -> bool {
        self.verify_channel_id == Some(channel_id)
            && !self
                .admin_role_id
                .is_some_and(|admin| author_roles.contains(&admin))
    }

    /// The underlying engine.
    #[must_use]
    pub fn engine(&self) -> &VerificationEngine<L> {
        &self.engine
    }

    /// Subscribe to verification events.
    #[must_use]
    pub fn subscribe_events(&self) -> VerifyEventsChannel {
        self.events_tx.subscribe()
    }

    /// Handle one verification command.
    ///
    /// The ledger is durable before a [`Reply::Verified`] is returned, so the
    /// caller may assign roles as soon as it has the reply.
    pub async fn handle(&self, request: VerifyRequest) -> Reply {
        if self
            .verify_channel_id
            .is_some_and(|channel| channel != request.channel_id)
        {
            return Reply::WrongChannel;
        }

        let VerifyRequest {
            requester,
            email,
            username,
            ..
        } = request;
        let email = normalize_email(&email);

        match self.engine.verify(requester.id, &email, &username).await {
            Ok(verified) => {
                info!(
                    "{} successfully verified their purchase, roles {:?}",
                    requester.name, verified.roles
                );
                let _ = self.events_tx.send(VerifyEvent::Verified {
                    requester,
                    email,
                    username,
                    roles: verified.roles.clone(),
                });
                self.spawn_snapshot_flush();
                Reply::Verified {
                    roles: verified.roles,
                }
            }
            Err(VerifyError::VerificationFailed) => {
                info!("{} failed to verify their purchase", requester.name);
                let _ = self.events_tx.send(VerifyEvent::Failed {
                    requester,
                    email,
                    username,
                });
                Reply::Failed
            }
            Err(e) => {
                info!("{} was refused: {e}", requester.name);
                e.into()
            }
        }
    }

    /// Wait for outstanding snapshot flushes.
    pub async fn drain(&self) {
        let mut flushes = std::mem::take(&mut *self.flushes.lock());
        while flushes.join_next().await.is_some() {}
    }

    fn spawn_snapshot_flush(&self) {
        let engine = Arc::clone(&self.engine);
        let mut flushes = self.flushes.lock();
        while flushes.try_join_next().is_some() {}
        flushes.spawn(async move {
            if let Err(e) = engine.flush_redemption_snapshot().await {
                warn!("Failed to export redemption snapshot: {e}");
            }
        });
    }
}
