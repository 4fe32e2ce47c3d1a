//! Account data model: ids, records, tag sets and the category taxonomy.

mod taxonomy;

pub use taxonomy::{Category, Taxonomy};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Opaque platform account identifier.
///
/// Numeric ids from the API are kept in their decimal string form so that
/// string and integer ids share one representation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for AccountId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Set of category labels attached to an account.
///
/// Only grows through [`TagSet::union_with`] during propagation; seeding
/// replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `other` into this set, returning how many tags were new.
    pub fn union_with(&mut self, other: &TagSet) -> usize {
        let before = self.0.len();
        self.0.extend(other.0.iter().cloned());
        self.0.len() - before
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        self.0.insert(tag.into())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn is_superset(&self, other: &TagSet) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Everything known about one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub handle: String,
    #[serde(default)]
    pub description: String,
    /// Accounts this account follows (outgoing).
    #[serde(default)]
    pub friends: Vec<AccountId>,
    /// Accounts following this account (incoming).
    #[serde(default)]
    pub followers: Vec<AccountId>,
    #[serde(default)]
    pub tags: TagSet,
}

impl AccountRecord {
    pub fn new(id: impl Into<AccountId>, handle: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: handle.into(),
            description: String::new(),
            friends: Vec::new(),
            followers: Vec::new(),
            tags: TagSet::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_friends<I, T>(mut self, friends: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AccountId>,
    {
        self.friends = friends.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_followers<I, T>(mut self, followers: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AccountId>,
    {
        self.followers = followers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Handle in its matching form (see [`normalize_handle`]).
    pub fn normalized_handle(&self) -> String {
        normalize_handle(&self.handle)
    }
}

/// A manually curated seed account: handle plus its authoritative tags.
/// The first tag is the account's primary category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAccount {
    pub handle: String,
    pub tags: Vec<String>,
}

impl ReferenceAccount {
    pub fn new<I, S>(handle: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            handle: handle.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn primary_tag(&self) -> Option<&str> {
        self.tags.first().map(String::as_str)
    }
}

/// Strip a leading `@` and lowercase, so `@Foo` and `foo` match.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_lowercase()
}
