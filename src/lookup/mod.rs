//! Purchase lookup against the payment provider.
//!
//! The verification engine only sees the [`PurchaseLookup`] trait; the PayPal
//! transaction-search client is the production implementation.

mod paypal;

pub use paypal::{PayPalClient, PayPalConfig};

use crate::error::Result;
use crate::verify::ItemId;
use std::future::Future;
use std::sync::Arc;

/// One purchased item as reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transaction {
    /// Purchased item identifier.
    pub item_id: ItemId,
    /// Payer email as recorded by the provider.
    pub buyer_email: String,
    /// Marketplace username attached to the payment, if any.
    pub buyer_username: Option<String>,
    /// Provider transaction identifier.
    pub transaction_id: String,
}

/// Source of purchase records for a claimed email.
pub trait PurchaseLookup: Send + Sync {
    /// Find transactions paid from `email` that match the marketplace `username`.
    ///
    /// An empty result means the provider knows no matching purchase.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached or answers with
    /// something unusable.
    fn find_transactions(
        &self,
        email: &str,
        username: &str,
    ) -> impl Future<Output = Result<Vec<Transaction>>> + Send;
}

impl<T: PurchaseLookup> PurchaseLookup for Arc<T> {
    fn find_transactions(
        &self,
        email: &str,
        username: &str,
    ) -> impl Future<Output = Result<Vec<Transaction>>> + Send {
        (**self).find_transactions(email, username)
    }
}
