//! Seed classification: give curated reference accounts their tags.
//!
//! Seed tags are ground truth. They replace whatever a node carried before
//! and are applied exactly once, before the first propagation pass.

use std::collections::HashMap;

use crate::account::{AccountId, ReferenceAccount, TagSet};
use crate::error::{Result, TagspreadError};
use crate::graph::RelationshipGraph;
use crate::resolver::AccountResolver;

/// Two reference entries resolved to the same account with different tags.
/// The later entry wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedConflict {
    pub id: AccountId,
    pub handle: String,
    pub overwritten: TagSet,
    pub applied: TagSet,
}

/// What [`seed`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Accounts whose tags were set, in reference order
    pub seeded: Vec<AccountId>,
    /// Seeds that were not in the graph and were added as isolated nodes
    pub inserted: Vec<AccountId>,
    /// Handles the resolver could not find
    pub missing: Vec<String>,
    pub conflicts: Vec<SeedConflict>,
}

/// Tag every reference account in `graph`.
///
/// Handles are matched against existing nodes first (case-insensitive,
/// leading `@` ignored). Unknown handles are fetched through `resolver`
/// and inserted without edges. Handles the resolver cannot find are
/// reported and skipped; transient resolver errors abort.
pub async fn seed(
    graph: &mut RelationshipGraph,
    reference_accounts: &[ReferenceAccount],
    resolver: &dyn AccountResolver,
) -> Result<SeedReport> {
    if graph.passes_applied() > 0 {
        return Err(TagspreadError::SeedAfterPropagation(graph.passes_applied()));
    }

    let mut report = SeedReport::default();
    let mut applied: HashMap<AccountId, TagSet> = HashMap::new();

    for reference in reference_accounts {
        let Some(id) = locate(graph, reference, resolver, &mut report).await? else {
            continue;
        };

        let tags: TagSet = reference.tags.iter().cloned().collect();
        if let Some(previous) = applied.get(&id) {
            if previous != &tags {
                log::warn!(
                    "Reference account @{} ({}) seeded twice with different tags; using {:?}",
                    reference.handle,
                    id,
                    tags.to_vec()
                );
                report.conflicts.push(SeedConflict {
                    id: id.clone(),
                    handle: reference.handle.clone(),
                    overwritten: previous.clone(),
                    applied: tags.clone(),
                });
            }
        }

        graph.replace_tags(&id, tags.clone());
        log::debug!("Seeded @{} with {:?}", reference.handle, tags.to_vec());
        if !report.seeded.contains(&id) {
            report.seeded.push(id.clone());
        }
        applied.insert(id, tags);
    }

    log::info!(
        "Seeded {} account(s) ({} added to the graph, {} not found, {} conflict(s))",
        report.seeded.len(),
        report.inserted.len(),
        report.missing.len(),
        report.conflicts.len()
    );
    Ok(report)
}

/// Find the node for a reference account, fetching and inserting it if needed.
async fn locate(
    graph: &mut RelationshipGraph,
    reference: &ReferenceAccount,
    resolver: &dyn AccountResolver,
    report: &mut SeedReport,
) -> Result<Option<AccountId>> {
    if let Some(id) = graph.find_by_handle(&reference.handle) {
        return Ok(Some(id.clone()));
    }

    let record = match resolver.resolve_by_handle(&reference.handle).await {
        Ok(record) => record,
        Err(e) if e.is_not_found() => {
            log::warn!("Reference account @{} not found: {}", reference.handle, e);
            report.missing.push(reference.handle.clone());
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let id = record.id.clone();
    // The handle may have changed since the graph was built
    if graph.contains(&id) {
        log::info!("Reference account @{} matched node {} by id", reference.handle, id);
        return Ok(Some(id));
    }

    graph.insert_node(record);
    report.inserted.push(id.clone());
    Ok(Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountRecord;
    use crate::graph::{propagate, GraphBuilder};
    use crate::resolver::MemoryResolver;
    use async_trait::async_trait;

    fn id(n: u64) -> AccountId {
        AccountId::from(n)
    }

    fn tags(names: &[&str]) -> TagSet {
        names.iter().copied().collect()
    }

    struct Offline;

    #[async_trait]
    impl AccountResolver for Offline {
        async fn resolve(&self, id: &AccountId) -> Result<AccountRecord> {
            Err(TagspreadError::TransientFetch(format!("offline: {}", id)))
        }

        async fn resolve_by_handle(&self, handle: &str) -> Result<AccountRecord> {
            Err(TagspreadError::TransientFetch(format!("offline: {}", handle)))
        }
    }

    async fn two_node_graph(resolver: &MemoryResolver) -> RelationshipGraph {
        let records = vec![
            AccountRecord::new(1u64, "alice").with_friends([2u64]),
            AccountRecord::new(2u64, "NYTFood")
                .with_followers([1u64])
                .with_tags(["politics"]),
        ];
        GraphBuilder::new(resolver).build(records).await.unwrap().0
    }

    #[tokio::test]
    async fn test_seed_overwrites_existing_tags() {
        let resolver = MemoryResolver::default();
        let mut graph = two_node_graph(&resolver).await;

        let report = seed(
            &mut graph,
            &[ReferenceAccount::new("@nytfood", ["food"])],
            &resolver,
        )
        .await
        .unwrap();

        assert_eq!(graph.tags(&id(2)), Some(&tags(&["food"])));
        assert_eq!(report.seeded, vec![id(2)]);
        assert!(report.inserted.is_empty());
        assert_eq!(resolver.lookups(), 0);
    }

    #[tokio::test]
    async fn test_seed_then_propagate_scenario() {
        let resolver = MemoryResolver::default();
        let records = vec![
            AccountRecord::new("A", "a").with_friends(["B"]),
            AccountRecord::new("B", "b").with_followers(["A"]),
        ];
        let (mut graph, _) = GraphBuilder::new(&resolver).build(records).await.unwrap();
        seed(&mut graph, &[ReferenceAccount::new("b", ["food"])], &resolver)
            .await
            .unwrap();

        propagate(&mut graph).unwrap();
        assert_eq!(graph.tags(&AccountId::from("A")), Some(&tags(&["food"])));
        assert_eq!(graph.tags(&AccountId::from("B")), Some(&tags(&["food"])));
        assert!(propagate(&mut graph).unwrap().is_fixpoint());
    }

    #[tokio::test]
    async fn test_unknown_handle_becomes_isolated_node() {
        let resolver = MemoryResolver::new([
            AccountRecord::new(50u64, "espn").with_followers([1u64]),
        ]);
        let mut graph = two_node_graph(&resolver).await;
        let edges_before = graph.edge_count();

        let report = seed(&mut graph, &[ReferenceAccount::new("ESPN", ["sports"])], &resolver)
            .await
            .unwrap();

        assert_eq!(report.inserted, vec![id(50)]);
        assert_eq!(graph.tags(&id(50)), Some(&tags(&["sports"])));
        assert_eq!(graph.edge_count(), edges_before);
        assert!(graph.followers_of(&id(50)).is_empty());
    }

    #[tokio::test]
    async fn test_renamed_handle_matches_by_id() {
        // Graph knows account 2 as NYTFood; the platform now calls it nytcooking
        let resolver = MemoryResolver::new([AccountRecord::new(2u64, "nytcooking")]);
        let mut graph = two_node_graph(&resolver).await;
        let nodes_before = graph.len();

        let report = seed(
            &mut graph,
            &[ReferenceAccount::new("nytcooking", ["food"])],
            &resolver,
        )
        .await
        .unwrap();

        assert_eq!(graph.len(), nodes_before);
        assert!(report.inserted.is_empty());
        assert_eq!(graph.tags(&id(2)), Some(&tags(&["food"])));
    }

    #[tokio::test]
    async fn test_missing_handle_is_reported() {
        let resolver = MemoryResolver::default();
        let mut graph = two_node_graph(&resolver).await;

        let report = seed(
            &mut graph,
            &[
                ReferenceAccount::new("ghost", ["food"]),
                ReferenceAccount::new("alice", ["sports"]),
            ],
            &resolver,
        )
        .await
        .unwrap();

        assert_eq!(report.missing, vec!["ghost".to_string()]);
        assert_eq!(report.seeded, vec![id(1)]);
    }

    #[tokio::test]
    async fn test_conflicting_seeds_last_write_wins() {
        let resolver = MemoryResolver::default();
        let mut graph = two_node_graph(&resolver).await;

        let report = seed(
            &mut graph,
            &[
                ReferenceAccount::new("alice", ["food"]),
                ReferenceAccount::new("@ALICE", ["sports"]),
                ReferenceAccount::new("alice", ["sports"]),
            ],
            &resolver,
        )
        .await
        .unwrap();

        assert_eq!(graph.tags(&id(1)), Some(&tags(&["sports"])));
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].overwritten, tags(&["food"]));
        assert_eq!(report.seeded, vec![id(1)]);
    }

    #[tokio::test]
    async fn test_transient_error_aborts_seeding() {
        let resolver = MemoryResolver::default();
        let mut graph = two_node_graph(&resolver).await;

        let err = seed(&mut graph, &[ReferenceAccount::new("stranger", ["food"])], &Offline)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_seeding_after_propagation_is_rejected() {
        let resolver = MemoryResolver::default();
        let mut graph = two_node_graph(&resolver).await;
        propagate(&mut graph).unwrap();

        let err = seed(&mut graph, &[ReferenceAccount::new("alice", ["food"])], &resolver)
            .await
            .unwrap_err();
        assert!(matches!(err, TagspreadError::SeedAfterPropagation(1)));
    }
}
