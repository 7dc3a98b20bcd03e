//! Purchase verification core.
//!
//! A claim (requester, email, marketplace username) is checked against the
//! payment provider, and the items it reports are redeemed at most once per
//! email through a durable ledger.
//!
//! # Flow
//!
//! ```text
//! verify(requester, email, username)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Normalize email     │
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   error / empty
//! │ Purchase lookup     │ ─────────────────► VerificationFailed
//! └─────────┬───────────┘
//!           ▼
//! ┌─────────────────────┐   nothing new
//! │ Ledger upsert       │ ─────────────────► AlreadyVerifiedPurchases (same requester)
//! │ (per-email lock)    │                    AlreadyVerifiedEmail     (other requester)
//! └─────────┬───────────┘
//!           ▼
//!   Roles for newly redeemed items
//! ```

mod email;
mod engine;
mod ledger;
mod roles;

pub use email::normalize_email;
pub(crate) use email::same_email;
pub use engine::{VerificationEngine, VerifiedPurchase, VerifyError};
pub use ledger::{Redemption, RedemptionLedger, RedemptionRecord, RequesterId};
pub use roles::{ItemId, RoleId, RoleMapping};
