//! Verification engine: classifies a claim and computes its role grants.

use crate::error::Result;
use crate::lookup::PurchaseLookup;
use crate::verify::email::normalize_email;
use crate::verify::ledger::{RedemptionLedger, RedemptionRecord, RequesterId};
use crate::verify::roles::{ItemId, RoleId, RoleMapping};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// File name of the exported ledger snapshot when no path is configured.
const DEFAULT_SNAPSHOT_FILE: &str = "redemptions.json";

/// Expected, user-facing reasons a claim is not granted.
///
/// None of these carry the underlying cause; operators find it in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Every item the provider reports for this email is already redeemed by
    /// the requester.
    #[error("purchases already verified")]
    AlreadyVerifiedPurchases,

    /// The email is bound to another member and has nothing new to redeem.
    #[error("email already verified")]
    AlreadyVerifiedEmail,

    /// No matching purchase, or the claim could not be checked.
    #[error("verification failed")]
    VerificationFailed,
}

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPurchase {
    /// Roles to grant the requester.
    pub roles: BTreeSet<RoleId>,
    /// Items redeemed by this verification.
    pub redeemed_items: BTreeSet<ItemId>,
    /// Redeemed items with no role mapping.
    pub unmapped_items: BTreeSet<ItemId>,
}

/// Orchestrates purchase lookup and the redemption ledger.
pub struct VerificationEngine<L> {
    lookup: L,
    ledger: Arc<RedemptionLedger>,
    roles: RoleMapping,
    snapshot_path: PathBuf,
}

impl<L: PurchaseLookup> VerificationEngine<L> {
    /// Create an engine over the given collaborators.
    ///
    /// The snapshot is written next to the ledger directory unless
    /// [`Self::with_snapshot_path`] says otherwise.
    #[must_use]
    pub fn new(lookup: L, ledger: Arc<RedemptionLedger>, roles: RoleMapping) -> Self {
        let snapshot_path = ledger
            .dir()
            .parent()
            .unwrap_or_else(|| ledger.dir())
            .join(DEFAULT_SNAPSHOT_FILE);
        Self {
            lookup,
            ledger,
            roles,
            snapshot_path,
        }
    }

    /// Set where [`Self::flush_redemption_snapshot`] writes.
    #[must_use]
    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    /// Verify a claim and redeem any new items it covers.
    ///
    /// The ledger is durably updated before this returns `Ok`; if the write
    /// fails the claim fails and nothing is redeemed.
    ///
    /// # Errors
    ///
    /// Returns one of the [`VerifyError`] outcomes when no new items can be
    /// redeemed.
    pub async fn verify(
        &self,
        requester_id: RequesterId,
        email: &str,
        username: &str,
    ) -> std::result::Result<VerifiedPurchase, VerifyError> {
        let email = normalize_email(email);
        let username = username.trim();
        if email.is_empty() {
            info!("Requester {requester_id} submitted an empty email");
            return Err(VerifyError::VerificationFailed);
        }

        if let Some(record) = self.ledger.get(&email) {
            debug!(
                "{email} already holds {} redeemed item(s) for requester {}",
                record.redeemed_items.len(),
                record.requester_id
            );
        }

        let transactions = match self.lookup.find_transactions(&email, username).await {
            Ok(transactions) => transactions,
            Err(e) => {
                warn!("Purchase lookup failed for {email} (requester {requester_id}): {e}");
                return Err(VerifyError::VerificationFailed);
            }
        };
        if transactions.is_empty() {
            info!("No matching purchases for {email} / {username} (requester {requester_id})");
            return Err(VerifyError::VerificationFailed);
        }

        let items: BTreeSet<ItemId> = transactions.into_iter().map(|t| t.item_id).collect();

        let redemption = match self.ledger.upsert(&email, requester_id, &items).await {
            Ok(redemption) => redemption,
            Err(e) => {
                error!("Ledger write failed for {email} (requester {requester_id}): {e}");
                return Err(VerifyError::VerificationFailed);
            }
        };

        if redemption.newly_redeemed.is_empty() {
            return Err(classify_no_new_items(&redemption.record, requester_id));
        }

        let (roles, unmapped_items) = self.roles.resolve(&redemption.newly_redeemed);
        if !unmapped_items.is_empty() {
            warn!(
                "Redeemed item(s) with no role mapping for {email}: {:?}",
                unmapped_items
            );
        }

        Ok(VerifiedPurchase {
            roles,
            redeemed_items: redemption.newly_redeemed,
            unmapped_items,
        })
    }

    /// Export the ledger to the snapshot file.
    ///
    /// Callers run this opportunistically after a successful verification;
    /// its outcome never changes a verification already returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub async fn flush_redemption_snapshot(&self) -> Result<()> {
        self.ledger.export_snapshot(&self.snapshot_path).await
    }

    /// The ledger backing this engine.
    #[must_use]
    pub fn ledger(&self) -> &RedemptionLedger {
        &self.ledger
    }

    /// The role mapping table.
    #[must_use]
    pub fn roles(&self) -> &RoleMapping {
        &self.roles
    }

    /// Where snapshots are written.
    #[must_use]
    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

fn classify_no_new_items(record: &RedemptionRecord, requester_id: RequesterId) -> VerifyError {
    if record.requester_id == requester_id {
        debug!("Requester {requester_id} already redeemed everything for {}", record.email);
        VerifyError::AlreadyVerifiedPurchases
    } else {
        info!(
            "Requester {requester_id} claimed {} which is bound to requester {}",
            record.email, record.requester_id
        );
        VerifyError::AlreadyVerifiedEmail
    }
}
