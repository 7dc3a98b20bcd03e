//! Verification event system.
//!
//! Reports to the chat server's report channel and admin notifications are
//! subscribers of this channel. Sending never waits for them.

use crate::service::Requester;
use crate::verify::RoleId;
use std::collections::BTreeSet;
use tokio::sync::broadcast;

/// Events emitted after a claim is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyEvent {
    /// A claim was verified and roles granted.
    Verified {
        /// Member who submitted the claim.
        requester: Requester,
        /// Normalized email of the claim.
        email: String,
        /// Marketplace username of the claim.
        username: String,
        /// Roles granted.
        roles: BTreeSet<RoleId>,
    },

    /// A claim could not be verified.
    Failed {
        /// Member who submitted the claim.
        requester: Requester,
        /// Normalized email of the claim.
        email: String,
        /// Marketplace username of the claim.
        username: String,
    },
}

impl VerifyEvent {
    /// Returns true for a successful verification.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Text of the direct message sent to administrators.
    #[must_use]
    pub fn admin_message(&self) -> String {
        match self {
            Self::Verified {
                requester,
                email,
                username,
                roles,
            } => {
                let roles: Vec<String> = roles.iter().map(|r| format!("<@&{r}>")).collect();
                format!(
                    "<@{}> successfully verified a purchase with email: {email} and username: {username}. Given roles: {}",
                    requester.id,
                    roles.join(" ")
                )
            }
            Self::Failed {
                requester,
                email,
                username,
            } => format!(
                "<@{}> failed to verify a purchase with email: {email} and username: {username}",
                requester.id
            ),
        }
    }
}

/// Report posted to the report channel for every handled claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Embed title.
    pub title: &'static str,
    /// One-line summary naming the member.
    pub description: String,
    /// Embed colour (green on success, red on failure).
    pub color: u32,
    /// Named fields, in display order.
    pub fields: Vec<(&'static str, String)>,
}

impl VerifyEvent {
    /// Build the report-channel entry for this event.
    #[must_use]
    pub fn report(&self) -> Report {
        const TITLE: &str = "Purchase verify of premium plugins";
        match self {
            Self::Verified {
                requester,
                email,
                username,
                roles,
            } => {
                let roles: Vec<String> = roles.iter().map(|r| format!("<@&{r}>")).collect();
                Report {
                    title: TITLE,
                    description: format!("Purchase verification completed for {}!", requester.name),
                    color: 0x2ecc71,
                    fields: vec![
                        ("Email", email.clone()),
                        ("Username", username.clone()),
                        ("Roles", roles.join(" ")),
                    ],
                }
            }
            Self::Failed {
                requester,
                email,
                username,
            } => Report {
                title: TITLE,
                description: format!("Purchase verification failed for {}!", requester.name),
                color: 0xe74c3c,
                fields: vec![("Email", email.clone()), ("Username", username.clone())],
            },
        }
    }
}

/// Channel for receiving verification events.
pub type VerifyEventsChannel = broadcast::Receiver<VerifyEvent>;

/// Sender for verification events.
pub type VerifyEventsSender = broadcast::Sender<VerifyEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (VerifyEventsSender, VerifyEventsChannel) {
    broadcast::channel(256)
}
