//! Email normalization shared by the ledger and the lookup adapter.

/// Normalize an email address for comparison and ledger keying.
///
/// Surrounding whitespace is trimmed and the address is lower-cased.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Returns true if two addresses refer to the same mailbox after normalization.
#[must_use]
pub fn same_email(a: &str, b: &str) -> bool {
    normalize_email(a) == normalize_email(b)
}
