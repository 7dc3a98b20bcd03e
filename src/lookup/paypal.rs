//! PayPal transaction search client.
//!
//! Uses the reporting API (`/v1/reporting/transactions`), which only accepts
//! date ranges of at most 31 days. The configured lookback is split into
//! windows that are fetched with bounded concurrency, following every page.

use crate::error::{Error, Result};
use crate::lookup::{PurchaseLookup, Transaction};
use crate::verify::same_email;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use futures::{StreamExt, TryStreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const LIVE_API: &str = "https://api-m.paypal.com";
const SANDBOX_API: &str = "https://api-m.sandbox.paypal.com";

/// Longest date range the reporting API accepts in one query.
const MAX_WINDOW_DAYS: i64 = 31;

/// Largest page size the reporting API accepts.
const PAGE_SIZE: u32 = 500;

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Configuration for the PayPal client.
#[derive(Debug, Clone)]
pub struct PayPalConfig {
    /// REST app client id.
    pub client_id: String,
    /// REST app client secret.
    pub client_secret: String,
    /// Use the sandbox environment.
    pub sandbox: bool,
    /// How far back to search for purchases.
    pub lookback_days: u32,
    /// Timeout for each provider request.
    pub query_timeout: Duration,
    /// Number of date windows fetched at once.
    pub max_concurrent_windows: usize,
}

impl Default for PayPalConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            sandbox: false,
            lookback_days: 3 * 365,
            query_timeout: Duration::from_secs(30),
            max_concurrent_windows: 4,
        }
    }
}

impl PayPalConfig {
    fn api_base(&self) -> &'static str {
        if self.sandbox {
            SANDBOX_API
        } else {
            LIVE_API
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Looks up purchases in a PayPal merchant account's transaction history.
pub struct PayPalClient {
    config: PayPalConfig,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl PayPalClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or the HTTP client cannot
    /// be built.
    pub fn new(config: PayPalConfig) -> Result<Self> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(Error::Config(
                "PayPal client id and secret are required".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(config.query_timeout)
            .build()?;

        info!(
            "PayPal lookup initialized (sandbox={}, lookback_days={})",
            config.sandbox, config.lookback_days
        );

        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|t| t.expires_at > Instant::now())
            .map(|t| t.value.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        debug!("Requesting PayPal access token");
        let request = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.api_base()))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send();
        let response: TokenResponse = self
            .bounded(async { request.await?.error_for_status()?.json().await })
            .await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *self.token.lock() = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    async fn fetch_window(
        &self,
        (start, end): (DateTime<Utc>, DateTime<Utc>),
        email: &str,
        username: &str,
    ) -> Result<Vec<Transaction>> {
        let token = self.access_token().await?;
        let url = format!("{}/v1/reporting/transactions", self.config.api_base());
        let start_date = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_date = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut found = Vec::new();
        let mut page = 1;
        loop {
            let request = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(&[
                    ("start_date", start_date.as_str()),
                    ("end_date", end_date.as_str()),
                    ("fields", "transaction_info,payer_info,cart_info"),
                ])
                .query(&[("page_size", PAGE_SIZE), ("page", page)])
                .send();
            let body: SearchPage = self
                .bounded(async { request.await?.error_for_status()?.json().await })
                .await?;

            found.extend(matching_transactions(&body.transaction_details, email, username));

            if page >= body.total_pages {
                break;
            }
            page += 1;
        }

        debug!(
            "Window {start_date}..{end_date}: {} matching item(s) over {page} page(s)",
            found.len()
        );
        Ok(found)
    }

    async fn bounded<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, reqwest::Error>>,
    {
        match tokio::time::timeout(self.config.query_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("PayPal request failed: {e}");
                Err(e.into())
            }
            Err(_) => {
                warn!("PayPal request timed out");
                Err(Error::Lookup("PayPal request timed out".to_string()))
            }
        }
    }
}

impl PurchaseLookup for PayPalClient {
    async fn find_transactions(&self, email: &str, username: &str) -> Result<Vec<Transaction>> {
        let windows = search_windows(Utc::now(), self.config.lookback_days);
        debug!("Searching {} PayPal window(s) for {email}", windows.len());

        let per_window: Vec<Vec<Transaction>> = futures::stream::iter(windows)
            .map(|window| self.fetch_window(window, email, username))
            .buffer_unordered(self.config.max_concurrent_windows.max(1))
            .try_collect()
            .await?;

        let mut transactions: Vec<Transaction> = per_window.into_iter().flatten().collect();
        transactions.sort();
        transactions.dedup();
        Ok(transactions)
    }
}

/// Split `[now - lookback_days, now]` into consecutive windows of at most
/// [`MAX_WINDOW_DAYS`], newest first.
fn search_windows(now: DateTime<Utc>, lookback_days: u32) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let earliest = now - ChronoDuration::days(i64::from(lookback_days));
    let mut windows = Vec::new();
    let mut end = now;
    while end > earliest {
        let start = (end - ChronoDuration::days(MAX_WINDOW_DAYS)).max(earliest);
        windows.push((start, end));
        end = start;
    }
    windows
}

/// Keep the cart items of transactions paid from `email`.
///
/// When a transaction carries a custom field, one of its words must equal
/// `username` (ignoring case); transactions without one match on email alone.
fn matching_transactions(
    details: &[TransactionDetail],
    email: &str,
    username: &str,
) -> Vec<Transaction> {
    let username = username.trim().to_lowercase();
    let mut matched = Vec::new();

    for detail in details {
        let Some(payer_email) = detail.payer_info.email_address.as_deref() else {
            continue;
        };
        if !same_email(payer_email, email) {
            continue;
        }

        let custom = detail
            .transaction_info
            .custom_field
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        if let Some(custom) = custom {
            if username.is_empty() || !mentions_user(custom, &username) {
                debug!(
                    "Transaction {} paid by {email} but marketplace user does not match",
                    detail.transaction_info.transaction_id
                );
                continue;
            }
        }

        for item in &detail.cart_info.item_details {
            let Some(item_id) = item
                .item_code
                .as_deref()
                .or(item.item_name.as_deref())
                .map(str::trim)
                .filter(|id| !id.is_empty())
            else {
                continue;
            };
            matched.push(Transaction {
                item_id: item_id.to_string(),
                buyer_email: payer_email.to_string(),
                buyer_username: custom.map(str::to_string),
                transaction_id: detail.transaction_info.transaction_id.clone(),
            });
        }
    }

    matched
}

/// Whether `custom` contains `username` (already lower-cased) as a whole word.
fn mentions_user(custom: &str, username: &str) -> bool {
    custom
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.'))
        .any(|word| word.to_lowercase() == username)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    transaction_details: Vec<TransactionDetail>,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct TransactionDetail {
    transaction_info: TransactionInfo,
    #[serde(default)]
    payer_info: PayerInfo,
    #[serde(default)]
    cart_info: CartInfo,
}

#[derive(Debug, Deserialize)]
struct TransactionInfo {
    transaction_id: String,
    #[serde(default)]
    custom_field: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PayerInfo {
    #[serde(default)]
    email_address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CartInfo {
    #[serde(default)]
    item_details: Vec<ItemDetail>,
}

#[derive(Debug, Deserialize)]
struct ItemDetail {
    #[serde(default)]
    item_code: Option<String>,
    #[serde(default)]
    item_name: Option<String>,
}
