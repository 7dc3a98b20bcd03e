//! Test harness wiring the verification engine to a scripted provider.
//!
//! The `TestHarness` owns a temporary data directory, so a test can drop the
//! engine and reopen the ledger from disk to simulate a restart.

use parking_lot::Mutex;
use purchase_verifier::verify::RedemptionLedger;
use purchase_verifier::{
    PurchaseLookup, Result, RoleMapping, Transaction, VerificationEngine, VerifiedPurchase,
    VerifyError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Role granted by `pluginA`.
pub const ROLE1: u64 = 1;

/// Role granted by `pluginB`.
pub const ROLE2: u64 = 2;

/// Payment provider whose sales are set by the test.
#[derive(Default)]
pub struct ScriptedLookup {
    sales: Mutex<HashMap<String, Vec<String>>>,
    unreachable: AtomicBool,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl ScriptedLookup {
    /// A provider that sleeps before answering, to widen race windows.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Record that `email` bought `items`.
    pub fn sell(&self, email: &str, items: &[&str]) {
        self.sales
            .lock()
            .entry(email.to_string())
            .or_default()
            .extend(items.iter().map(|i| (*i).to_string()));
    }

    /// Make every lookup fail as if the provider were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of lookups served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PurchaseLookup for ScriptedLookup {
    async fn find_transactions(&self, email: &str, username: &str) -> Result<Vec<Transaction>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(purchase_verifier::Error::Lookup(
                "connection reset by peer".to_string(),
            ));
        }

        let sales = self.sales.lock();
        Ok(sales
            .get(email)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Transaction {
                        item_id: item.clone(),
                        buyer_email: email.to_string(),
                        buyer_username: Some(username.to_string()),
                        transaction_id: format!("{email}-{i}"),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Engine over a temporary ledger and a scripted provider.
pub struct TestHarness {
    dir: TempDir,
    lookup: Arc<ScriptedLookup>,
    engine: Arc<VerificationEngine<Arc<ScriptedLookup>>>,
}

impl TestHarness {
    /// Harness with `pluginA -> ROLE1` and `pluginB -> ROLE2`.
    pub fn setup() -> Self {
        Self::setup_with_lookup(ScriptedLookup::default())
    }

    /// Harness using the given provider.
    pub fn setup_with_lookup(lookup: ScriptedLookup) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let lookup = Arc::new(lookup);
        let engine = Arc::new(Self::open_engine(&dir, &lookup));
        Self {
            dir,
            lookup,
            engine,
        }
    }

    fn open_engine(
        dir: &TempDir,
        lookup: &Arc<ScriptedLookup>,
    ) -> VerificationEngine<Arc<ScriptedLookup>> {
        let ledger = RedemptionLedger::open(dir.path().join("ledger")).expect("open ledger");
        VerificationEngine::new(Arc::clone(lookup), Arc::new(ledger), Self::roles())
    }

    /// Role table used by every harness.
    pub fn roles() -> RoleMapping {
        RoleMapping::new()
            .with_item("pluginA", [ROLE1])
            .with_item("pluginB", [ROLE2])
    }

    /// The scripted provider.
    pub fn lookup(&self) -> &ScriptedLookup {
        &self.lookup
    }

    /// The engine under test.
    pub fn engine(&self) -> Arc<VerificationEngine<Arc<ScriptedLookup>>> {
        Arc::clone(&self.engine)
    }

    /// Run one verification.
    pub async fn verify(
        &self,
        requester: u64,
        email: &str,
    ) -> std::result::Result<VerifiedPurchase, VerifyError> {
        self.engine.verify(requester, email, "marketplace-user").await
    }

    /// Drop the engine and reopen the ledger from disk.
    pub fn restart(&mut self) {
        self.engine = Arc::new(Self::open_engine(&self.dir, &self.lookup));
    }

    /// Reopen the ledger directory independently of the engine.
    pub fn reopen_ledger(&self) -> RedemptionLedger {
        RedemptionLedger::open(self.dir.path().join("ledger")).expect("reopen ledger")
    }
}
