//! Category ranking of reference accounts by follower count.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::account::{Category, ReferenceAccount, Taxonomy};
use crate::error::Result;
use crate::resolver::AccountResolver;

/// Accounts kept per category
pub const TOP_ACCOUNTS_PER_CATEGORY: usize = 9;

/// Follower-count lookups in flight at once
const CONCURRENT_LOOKUPS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedAccount {
    pub handle: String,
    pub follower_count: u64,
}

/// Top accounts per category, most followed first
pub type CategoryRanking = BTreeMap<Category, Vec<RankedAccount>>;

/// Rank reference accounts whose follower counts are already known.
///
/// Accounts are grouped by primary tag; those whose primary tag is not in
/// `categories` are left out. Within a category, ties keep input order.
/// Categories with no accounts do not appear in the result.
pub fn rank_accounts(accounts: &[(ReferenceAccount, u64)], categories: &Taxonomy) -> CategoryRanking {
    let mut ranking = CategoryRanking::new();

    for (account, follower_count) in accounts {
        let Some(category) = account.primary_tag().and_then(|tag| categories.category(tag)) else {
            continue;
        };
        ranking.entry(category).or_default().push(RankedAccount {
            handle: account.handle.clone(),
            follower_count: *follower_count,
        });
    }

    for ranked in ranking.values_mut() {
        // sort_by is stable: first-seen wins ties
        ranked.sort_by(|a, b| b.follower_count.cmp(&a.follower_count));
        ranked.truncate(TOP_ACCOUNTS_PER_CATEGORY);
    }

    ranking
}

/// Rank reference accounts, asking `resolver` for each follower count.
///
/// Only accounts whose primary tag is in `categories` are looked up.
/// Accounts the resolver cannot find are dropped; transient errors abort.
pub async fn rank(
    reference_accounts: &[ReferenceAccount],
    categories: &Taxonomy,
    resolver: &dyn AccountResolver,
) -> Result<CategoryRanking> {
    let candidates: Vec<&ReferenceAccount> = reference_accounts
        .iter()
        .filter(|account| {
            account
                .primary_tag()
                .map(|tag| categories.contains(tag))
                .unwrap_or(false)
        })
        .collect();

    log::info!(
        "Fetching follower counts for {} of {} reference account(s)",
        candidates.len(),
        reference_accounts.len()
    );

    // buffered() yields in input order, which keeps tie-breaking stable
    let lookups: Vec<_> = stream::iter(candidates)
        .map(|account| async move { (account, resolver.follower_count(&account.handle).await) })
        .buffered(CONCURRENT_LOOKUPS)
        .collect()
        .await;

    let mut counted = Vec::with_capacity(lookups.len());
    for (account, result) in lookups {
        match result {
            Ok(count) => counted.push((account.clone(), count)),
            Err(e) if e.is_not_found() => {
                log::warn!("Leaving @{} out of the ranking: {}", account.handle, e);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(rank_accounts(&counted, categories))
}
