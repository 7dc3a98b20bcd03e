//! # purchase-verifier
//!
//! Lets members of a community chat server prove they bought a plugin by
//! submitting the email they paid with and their marketplace username. The
//! claim is checked against the PayPal transaction history; each purchased
//! item is redeemed at most once per email, and redeemed items map to access
//! roles.
//!
//! ## Layout
//!
//! - [`verify`]: the verification engine, role mapping and durable
//!   redemption ledger
//! - [`lookup`]: the payment provider boundary and the PayPal client
//! - [`service`]: command handling, replies and event publication
//! - [`config`]: TOML configuration
//!
//! ## Example
//!
//! ```rust,ignore
//! use purchase_verifier::{ServiceBuilder, VerifierConfig, VerifyRequest, Requester};
//!
//! let service = ServiceBuilder::new(VerifierConfig::default()).build()?;
//! let reply = service
//!     .handle(VerifyRequest {
//!         requester: Requester { id: 42, name: "alice".into() },
//!         channel_id: 1,
//!         email: "alice@example.com".into(),
//!         username: "alice".into(),
//!     })
//!     .await;
//! println!("{}", reply.message());
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod lookup;
pub mod service;
pub mod verify;

pub use config::VerifierConfig;
pub use error::{Error, Result};
pub use event::{Report, VerifyEvent, VerifyEventsChannel};
pub use lookup::{PayPalClient, PurchaseLookup, Transaction};
pub use service::{Reply, Requester, ServiceBuilder, VerifierService, VerifyRequest};
pub use verify::{
    RedemptionLedger, RedemptionRecord, RoleMapping, VerificationEngine, VerifiedPurchase,
    VerifyError,
};
