//! Concurrent claims against the same and different emails.

use super::{ScriptedLookup, TestHarness};
use purchase_verifier::VerifyError;
use std::collections::BTreeSet;
use std::time::Duration;

/// Racing members claiming one email: each item is granted exactly once.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_email_race_grants_each_item_once() {
    let harness = TestHarness::setup_with_lookup(ScriptedLookup::with_latency(
        Duration::from_millis(10),
    ));
    harness.lookup().sell("a@x.com", &["pluginA", "pluginB"]);

    let mut handles = Vec::new();
    for requester in 0..12u64 {
        let engine = harness.engine();
        handles.push(tokio::spawn(async move {
            (requester, engine.verify(requester, "a@x.com", "racer").await)
        }));
    }

    let mut granted_items = Vec::new();
    let mut winners = BTreeSet::new();
    for handle in handles {
        let (requester, outcome) = handle.await.expect("task");
        match outcome {
            Ok(verified) => {
                winners.insert(requester);
                granted_items.extend(verified.redeemed_items);
            }
            Err(VerifyError::AlreadyVerifiedEmail | VerifyError::AlreadyVerifiedPurchases) => {}
            Err(VerifyError::VerificationFailed) => panic!("unexpected failure"),
        }
    }

    granted_items.sort();
    assert_eq!(granted_items, vec!["pluginA".to_string(), "pluginB".to_string()]);
    assert_eq!(winners.len(), 1);

    let record = harness.engine().ledger().get("a@x.com").expect("record");
    assert!(winners.contains(&record.requester_id));
}

/// The same requester double-submitting: one success, one refusal.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_double_submit_is_idempotent() {
    let harness = TestHarness::setup_with_lookup(ScriptedLookup::with_latency(
        Duration::from_millis(10),
    ));
    harness.lookup().sell("a@x.com", &["pluginA"]);

    let (first, second) = tokio::join!(harness.verify(7, "a@x.com"), harness.verify(7, "a@x.com"));
    let outcomes = [first, second];

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|o| *o == Err(VerifyError::AlreadyVerifiedPurchases)));
}

/// Claims for different emails all succeed and all land on disk.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_emails_proceed_in_parallel() {
    let harness = TestHarness::setup_with_lookup(ScriptedLookup::with_latency(
        Duration::from_millis(5),
    ));
    let emails: Vec<String> = (0..20).map(|i| format!("buyer{i}@x.com")).collect();
    for email in &emails {
        harness.lookup().sell(email, &["pluginA"]);
    }

    let mut handles = Vec::new();
    for (requester, email) in emails.iter().cloned().enumerate() {
        let engine = harness.engine();
        handles.push(tokio::spawn(async move {
            engine.verify(requester as u64, &email, "buyer").await
        }));
    }
    for handle in handles {
        assert!(handle.await.expect("task").is_ok());
    }

    let ledger = harness.reopen_ledger();
    assert_eq!(ledger.len(), emails.len());
    for (requester, email) in emails.iter().enumerate() {
        assert_eq!(ledger.get(email).expect("record").requester_id, requester as u64);
    }
}
