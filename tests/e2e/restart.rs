//! Redemptions survive a restart.

use super::harness::ROLE2;
use super::TestHarness;
use purchase_verifier::VerifyError;
use std::collections::BTreeSet;

#[tokio::test]
async fn test_redemption_survives_restart() {
    let mut harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA"]);
    harness.verify(1, "a@x.com").await.expect("verified");

    harness.restart();

    assert_eq!(
        harness.verify(1, "a@x.com").await,
        Err(VerifyError::AlreadyVerifiedPurchases)
    );
    assert_eq!(
        harness.verify(2, "a@x.com").await,
        Err(VerifyError::AlreadyVerifiedEmail)
    );
}

#[tokio::test]
async fn test_new_item_after_restart() {
    let mut harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA"]);
    harness.verify(1, "a@x.com").await.expect("verified");

    harness.restart();
    harness.lookup().sell("a@x.com", &["pluginB"]);

    let verified = harness.verify(1, "a@x.com").await.expect("verified");
    assert_eq!(verified.roles, BTreeSet::from([ROLE2]));

    let record = harness.reopen_ledger().get("a@x.com").expect("record");
    assert_eq!(record.redeemed_items.len(), 2);
}

#[tokio::test]
async fn test_snapshot_lists_all_records() {
    let harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA"]);
    harness.lookup().sell("b@x.com", &["pluginB"]);
    harness.verify(1, "a@x.com").await.expect("a");
    harness.verify(2, "b@x.com").await.expect("b");

    let engine = harness.engine();
    engine.flush_redemption_snapshot().await.expect("flush");

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(engine.snapshot_path()).expect("read"))
            .expect("json");
    let emails: Vec<&str> = json["records"]
        .as_array()
        .expect("records")
        .iter()
        .filter_map(|r| r["email"].as_str())
        .collect();
    assert_eq!(emails, vec!["a@x.com", "b@x.com"]);
}
