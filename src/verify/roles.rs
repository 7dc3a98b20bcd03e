//! Role mapping table: purchased item identifier to access roles.

use std::collections::{BTreeSet, HashMap};

/// Identifier of a purchasable item (provider item code or name).
pub type ItemId = String;

/// Identifier of an access role on the chat server.
pub type RoleId = u64;

/// Static mapping from item identifier to the roles it grants.
///
/// Loaded once from configuration and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct RoleMapping {
    roles: HashMap<ItemId, BTreeSet<RoleId>>,
}

impl RoleMapping {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add roles for an item, merging with any roles already mapped to it.
    #[must_use]
    pub fn with_item<I>(mut self, item_id: impl Into<ItemId>, roles: I) -> Self
    where
        I: IntoIterator<Item = RoleId>,
    {
        self.roles.entry(item_id.into()).or_default().extend(roles);
        self
    }

    /// Roles granted by a single item; empty if the item is unmapped.
    #[must_use]
    pub fn roles_for(&self, item_id: &str) -> BTreeSet<RoleId> {
        self.roles.get(item_id).cloned().unwrap_or_default()
    }

    /// Returns true if the item has an entry in the table.
    #[must_use]
    pub fn is_mapped(&self, item_id: &str) -> bool {
        self.roles.contains_key(item_id)
    }

    /// Resolve a set of items into the union of their roles.
    ///
    /// Returns the roles together with the items that had no mapping.
    pub fn resolve<'a, I>(&self, items: I) -> (BTreeSet<RoleId>, BTreeSet<ItemId>)
    where
        I: IntoIterator<Item = &'a ItemId>,
    {
        let mut roles = BTreeSet::new();
        let mut unmapped = BTreeSet::new();
        for item in items {
            match self.roles.get(item) {
                Some(mapped) => roles.extend(mapped.iter().copied()),
                None => {
                    unmapped.insert(item.clone());
                }
            }
        }
        (roles, unmapped)
    }

    /// Number of mapped items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Check if no items are mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl From<HashMap<ItemId, Vec<RoleId>>> for RoleMapping {
    fn from(table: HashMap<ItemId, Vec<RoleId>>) -> Self {
        table
            .into_iter()
            .fold(Self::new(), |mapping, (item, roles)| mapping.with_item(item, roles))
    }
}
