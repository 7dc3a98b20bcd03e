//! End-to-end tests for purchase verification.
//!
//! Every test runs the real engine over an on-disk ledger in a temporary
//! directory; only the payment provider is scripted.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test e2e
//! cargo test --test e2e concurrency
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod concurrency;
mod harness;
mod restart;
mod scenarios;

pub use harness::{ScriptedLookup, TestHarness};
