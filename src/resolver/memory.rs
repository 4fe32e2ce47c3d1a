use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::AccountResolver;
use crate::account::{normalize_handle, AccountId, AccountRecord};
use crate::error::{Result, TagspreadError};

/// Resolver over a fixed set of records held in memory.
///
/// Backs offline runs (records previously saved to the store) and tests.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    by_id: HashMap<AccountId, AccountRecord>,
    by_handle: HashMap<String, AccountId>,
    follower_counts: HashMap<String, u64>,
    lists: HashMap<(String, String), Vec<AccountId>>,
    lookups: AtomicUsize,
}

impl MemoryResolver {
    pub fn new(records: impl IntoIterator<Item = AccountRecord>) -> Self {
        let mut resolver = Self::default();
        for record in records {
            resolver.insert(record);
        }
        resolver
    }

    /// Add or replace a record.
    pub fn insert(&mut self, record: AccountRecord) {
        self.by_handle
            .insert(record.normalized_handle(), record.id.clone());
        self.by_id.insert(record.id.clone(), record);
    }

    /// Report `count` followers for `handle` instead of the length of its
    /// follower list (profiles carry the full count, id lists may be partial).
    #[must_use]
    pub fn with_follower_count(mut self, handle: &str, count: u64) -> Self {
        self.follower_counts.insert(normalize_handle(handle), count);
        self
    }

    #[must_use]
    pub fn with_list<I, T>(mut self, owner: &str, slug: &str, members: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AccountId>,
    {
        self.lists.insert(
            (normalize_handle(owner), slug.to_lowercase()),
            members.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Number of lookups served so far, found or not.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[async_trait]
impl AccountResolver for MemoryResolver {
    async fn resolve(&self, id: &AccountId) -> Result<AccountRecord> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.by_id
            .get(id)
            .cloned()
            .ok_or_else(|| TagspreadError::AccountNotFound(format!("id {}", id)))
    }

    async fn resolve_by_handle(&self, handle: &str) -> Result<AccountRecord> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.by_handle
            .get(&normalize_handle(handle))
            .and_then(|id| self.by_id.get(id))
            .cloned()
            .ok_or_else(|| TagspreadError::AccountNotFound(format!("handle {}", handle)))
    }

    async fn follower_count(&self, handle: &str) -> Result<u64> {
        if let Some(count) = self.follower_counts.get(&normalize_handle(handle)) {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            return Ok(*count);
        }
        let record = self.resolve_by_handle(handle).await?;
        Ok(record.followers.len() as u64)
    }

    async fn list_members(&self, owner: &str, slug: &str) -> Result<Vec<AccountRecord>> {
        let key = (normalize_handle(owner), slug.to_lowercase());
        let members = self
            .lists
            .get(&key)
            .ok_or_else(|| TagspreadError::AccountNotFound(format!("list {}/{}", owner, slug)))?;
        Ok(members
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> MemoryResolver {
        MemoryResolver::new([
            AccountRecord::new(1u64, "Alice").with_followers([2u64, 3u64]),
            AccountRecord::new(2u64, "bob"),
        ])
    }

    #[tokio::test]
    async fn test_resolve_by_id_and_handle() {
        let resolver = resolver();
        assert_eq!(resolver.resolve(&AccountId::from(2u64)).await.unwrap().handle, "bob");
        assert_eq!(resolver.resolve_by_handle("@ALICE").await.unwrap().id, AccountId::from(1u64));
        assert_eq!(resolver.lookups(), 2);
    }

    #[tokio::test]
    async fn test_missing_account_is_not_found() {
        let resolver = resolver();
        let err = resolver.resolve(&AccountId::from(99u64)).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(resolver.resolve_by_handle("carol").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_follower_count_prefers_explicit_count() {
        let resolver = resolver().with_follower_count("bob", 500);
        assert_eq!(resolver.follower_count("alice").await.unwrap(), 2);
        assert_eq!(resolver.follower_count("@Bob").await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_list_members() {
        let resolver = resolver().with_list("curator", "Food", [2u64, 1u64, 77u64]);
        let members = resolver.list_members("@curator", "food").await.unwrap();
        let handles: Vec<_> = members.iter().map(|r| r.handle.as_str()).collect();
        assert_eq!(handles, vec!["bob", "Alice"]);
        assert!(resolver.list_members("curator", "sports").await.is_err());
    }
}
