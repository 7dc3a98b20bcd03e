//! Claim classification scenarios.

use super::harness::{ROLE1, ROLE2};
use super::TestHarness;
use purchase_verifier::VerifyError;
use std::collections::BTreeSet;

fn items(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|s| (*s).to_string()).collect()
}

/// New email with one mapped item is granted its role and recorded.
#[tokio::test]
async fn test_first_purchase_is_granted() {
    let harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA"]);

    let verified = harness.verify(1, "a@x.com").await.expect("verified");
    assert_eq!(verified.roles, BTreeSet::from([ROLE1]));
    assert_eq!(verified.redeemed_items, items(&["pluginA"]));

    let record = harness.engine().ledger().get("a@x.com").expect("record");
    assert_eq!(record.redeemed_items, items(&["pluginA"]));
    assert_eq!(record.requester_id, 1);
}

/// The same requester repeating a claim with nothing new is refused.
#[tokio::test]
async fn test_repeat_claim_is_already_verified_purchases() {
    let harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA"]);

    assert!(harness.verify(1, "a@x.com").await.is_ok());
    assert_eq!(
        harness.verify(1, "a@x.com").await,
        Err(VerifyError::AlreadyVerifiedPurchases)
    );
}

/// Another member claiming an already redeemed email is refused.
#[tokio::test]
async fn test_other_member_is_already_verified_email() {
    let harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA"]);

    assert!(harness.verify(1, "a@x.com").await.is_ok());
    assert_eq!(
        harness.verify(2, "A@X.com ").await,
        Err(VerifyError::AlreadyVerifiedEmail)
    );
    assert_eq!(
        harness.engine().ledger().get("a@x.com").expect("record").requester_id,
        1
    );
}

/// No purchase on record fails and leaves no trace in the ledger.
#[tokio::test]
async fn test_unknown_email_fails_without_record() {
    let harness = TestHarness::setup();

    assert_eq!(
        harness.verify(1, "b@x.com").await,
        Err(VerifyError::VerificationFailed)
    );
    assert!(harness.engine().ledger().get("b@x.com").is_none());
    assert!(harness.reopen_ledger().is_empty());
}

/// A later purchase under the same email grants only the new item's roles.
#[tokio::test]
async fn test_new_item_grants_only_new_roles() {
    let harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA"]);
    harness.verify(1, "a@x.com").await.expect("first");

    harness.lookup().sell("a@x.com", &["pluginB"]);
    let verified = harness.verify(1, "a@x.com").await.expect("second");

    assert_eq!(verified.roles, BTreeSet::from([ROLE2]));
    assert_eq!(verified.redeemed_items, items(&["pluginB"]));
    assert_eq!(
        harness.engine().ledger().get("a@x.com").expect("record").redeemed_items,
        items(&["pluginA", "pluginB"])
    );
}

/// Provider outages look like any other failure and redeem nothing.
#[tokio::test]
async fn test_provider_outage_fails_then_recovers() {
    let harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA"]);
    harness.lookup().set_unreachable(true);

    assert_eq!(
        harness.verify(1, "a@x.com").await,
        Err(VerifyError::VerificationFailed)
    );
    assert!(harness.engine().ledger().is_empty());

    harness.lookup().set_unreachable(false);
    assert!(harness.verify(1, "a@x.com").await.is_ok());
    assert_eq!(harness.lookup().calls(), 2);
}

/// Duplicate transactions for one item redeem it once.
#[tokio::test]
async fn test_duplicate_transactions_collapse() {
    let harness = TestHarness::setup();
    harness.lookup().sell("a@x.com", &["pluginA", "pluginA", "pluginB"]);

    let verified = harness.verify(1, "a@x.com").await.expect("verified");
    assert_eq!(verified.roles, BTreeSet::from([ROLE1, ROLE2]));
    assert_eq!(verified.redeemed_items, items(&["pluginA", "pluginB"]));
}
