//! Account resolvers: where account records come from.
//!
//! The graph builder, seed classifier and ranker only talk to the
//! [`AccountResolver`] trait. Pacing and retrying against the platform's
//! rate limits belongs to the implementations, never to the callers.

mod cache;
mod http;
mod memory;

pub use cache::CachingResolver;
pub use http::{parse_list_url, HttpResolver};
pub use memory::MemoryResolver;

use async_trait::async_trait;

use crate::account::{AccountId, AccountRecord};
use crate::error::{Result, TagspreadError};

/// Source of account records.
///
/// Lookups fail with [`TagspreadError::AccountNotFound`] when the account does
/// not exist (or is not visible), and with [`TagspreadError::TransientFetch`]
/// when the caller should try again later.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    /// Fetch one account, including its friend and follower id lists.
    async fn resolve(&self, id: &AccountId) -> Result<AccountRecord>;

    /// Fetch one account by handle (with or without a leading `@`).
    async fn resolve_by_handle(&self, handle: &str) -> Result<AccountRecord>;

    /// Number of followers of the account with this handle.
    async fn follower_count(&self, handle: &str) -> Result<u64> {
        let record = self.resolve_by_handle(handle).await?;
        Ok(record.followers.len() as u64)
    }

    /// Members of a curated account list owned by `owner`.
    async fn list_members(&self, owner: &str, slug: &str) -> Result<Vec<AccountRecord>> {
        Err(TagspreadError::Api(format!(
            "this resolver cannot read lists (requested {}/{})",
            owner, slug
        )))
    }
}
