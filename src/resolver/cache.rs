use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::AccountResolver;
use crate::account::{normalize_handle, AccountId, AccountRecord};
use crate::error::Result;

struct Caches {
    by_id: LruCache<AccountId, AccountRecord>,
    by_handle: LruCache<String, AccountRecord>,
    follower_counts: LruCache<String, u64>,
}

/// LRU caching decorator for any resolver
///
/// Only successful lookups are cached, so a transient failure is retried on
/// the next call. Lookups by handle use the normalized handle as key.
pub struct CachingResolver<R> {
    inner: R,
    caches: Mutex<Caches>,
}

impl<R: AccountResolver> CachingResolver<R> {
    /// Wrap `inner` with caches holding at most `capacity` entries each
    pub fn new(inner: R, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner,
            caches: Mutex::new(Caches {
                by_id: LruCache::new(cap),
                by_handle: LruCache::new(cap),
                follower_counts: LruCache::new(cap),
            }),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of records cached by id
    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_id.is_empty()
    }

    pub fn clear(&self) {
        let mut caches = self.lock();
        caches.by_id.clear();
        caches.by_handle.clear();
        caches.follower_counts.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Caches> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remember(&self, record: &AccountRecord) {
        let mut caches = self.lock();
        caches.by_id.put(record.id.clone(), record.clone());
        caches
            .by_handle
            .put(record.normalized_handle(), record.clone());
    }
}

#[async_trait]
impl<R: AccountResolver> AccountResolver for CachingResolver<R> {
    async fn resolve(&self, id: &AccountId) -> Result<AccountRecord> {
        if let Some(cached) = self.lock().by_id.get(id).cloned() {
            log::debug!("Cache hit for account id {}", id);
            return Ok(cached);
        }

        let record = self.inner.resolve(id).await?;
        self.remember(&record);
        Ok(record)
    }

    async fn resolve_by_handle(&self, handle: &str) -> Result<AccountRecord> {
        let key = normalize_handle(handle);
        if let Some(cached) = self.lock().by_handle.get(&key).cloned() {
            log::debug!("Cache hit for handle @{}", key);
            return Ok(cached);
        }

        let record = self.inner.resolve_by_handle(handle).await?;
        self.remember(&record);
        Ok(record)
    }

    async fn follower_count(&self, handle: &str) -> Result<u64> {
        let key = normalize_handle(handle);
        if let Some(count) = self.lock().follower_counts.get(&key).copied() {
            return Ok(count);
        }

        let count = self.inner.follower_count(handle).await?;
        self.lock().follower_counts.put(key, count);
        Ok(count)
    }

    async fn list_members(&self, owner: &str, slug: &str) -> Result<Vec<AccountRecord>> {
        let members = self.inner.list_members(owner, slug).await?;
        for member in &members {
            self.remember(member);
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryResolver;

    fn cached(capacity: usize) -> CachingResolver<MemoryResolver> {
        let inner = MemoryResolver::new([
            AccountRecord::new(1u64, "alice"),
            AccountRecord::new(2u64, "bob"),
            AccountRecord::new(3u64, "carol"),
        ]);
        CachingResolver::new(inner, capacity)
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let resolver = cached(10);
        let id = AccountId::from(1u64);
        resolver.resolve(&id).await.unwrap();
        resolver.resolve(&id).await.unwrap();
        assert_eq!(resolver.inner().lookups(), 1);
        assert_eq!(resolver.len(), 1);
    }

    #[tokio::test]
    async fn test_handle_lookup_fills_id_cache() {
        let resolver = cached(10);
        resolver.resolve_by_handle("@Bob").await.unwrap();
        resolver.resolve_by_handle("bob").await.unwrap();
        resolver.resolve(&AccountId::from(2u64)).await.unwrap();
        assert_eq!(resolver.inner().lookups(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let resolver = cached(10);
        let missing = AccountId::from(9u64);
        assert!(resolver.resolve(&missing).await.is_err());
        assert!(resolver.resolve(&missing).await.is_err());
        assert_eq!(resolver.inner().lookups(), 2);
        assert!(resolver.is_empty());
    }

    #[tokio::test]
    async fn test_eviction() {
        let resolver = cached(2);
        for id in [1u64, 2, 3] {
            resolver.resolve(&AccountId::from(id)).await.unwrap();
        }
        assert_eq!(resolver.len(), 2);
        // 1 was least recently used
        resolver.resolve(&AccountId::from(1u64)).await.unwrap();
        assert_eq!(resolver.inner().lookups(), 4);
    }

    #[tokio::test]
    async fn test_clear() {
        let resolver = cached(10);
        resolver.resolve(&AccountId::from(1u64)).await.unwrap();
        resolver.follower_count("alice").await.unwrap();
        resolver.clear();
        assert!(resolver.is_empty());
    }
}
