//! Graph construction from account records.
//!
//! Construction runs in two phases. The fetch phase finds every referenced
//! id that is not already known and asks the resolver for it, once. The
//! insert phase then materializes nodes and edges without any I/O, so a
//! failed fetch never leaves a half-inserted graph behind.

use std::collections::{HashMap, HashSet};

use super::RelationshipGraph;
use crate::account::{AccountId, AccountRecord};
use crate::error::Result;
use crate::resolver::AccountResolver;

/// What a build (or extend) did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Nodes created from input records
    pub input_nodes: usize,
    /// Nodes created from records fetched through the resolver
    pub resolved_nodes: usize,
    /// Referenced ids the resolver could not find; their edges were dropped
    pub skipped_ids: Vec<AccountId>,
    /// Friend/follower entries naming the record's own id
    pub self_references: usize,
    /// Input records repeating an id seen earlier in the same batch; ignored
    pub duplicate_records: usize,
    pub edges_added: usize,
}

/// Builds a [`RelationshipGraph`], resolving accounts referenced by edges
/// but missing from the input.
pub struct GraphBuilder<'a> {
    resolver: &'a dyn AccountResolver,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(resolver: &'a dyn AccountResolver) -> Self {
        Self { resolver }
    }

    /// Build a fresh graph from `records`.
    pub async fn build(
        &self,
        records: Vec<AccountRecord>,
    ) -> Result<(RelationshipGraph, BuildReport)> {
        let mut graph = RelationshipGraph::new();
        let report = self.extend(&mut graph, records).await?;
        Ok((graph, report))
    }

    /// Insert `records` into an existing graph.
    ///
    /// Records whose id already has a node keep the existing payload, but
    /// their edges are still added. Re-inserting the same records is a no-op.
    /// Within one batch the first record per id wins outright: later
    /// duplicates contribute neither payload nor edges.
    /// A transient resolver failure aborts before anything is inserted.
    pub async fn extend(
        &self,
        graph: &mut RelationshipGraph,
        records: Vec<AccountRecord>,
    ) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        let fetched = self.fetch_missing(graph, &records, &mut report).await?;
        insert_all(graph, records, fetched, &mut report)?;

        log::info!(
            "Graph now has {} nodes and {} edges ({} from input, {} resolved, {} skipped)",
            graph.len(),
            graph.edge_count(),
            report.input_nodes,
            report.resolved_nodes,
            report.skipped_ids.len()
        );
        Ok(report)
    }

    async fn fetch_missing(
        &self,
        graph: &RelationshipGraph,
        records: &[AccountRecord],
        report: &mut BuildReport,
    ) -> Result<HashMap<AccountId, AccountRecord>> {
        let missing = missing_ids(graph, records);
        if !missing.is_empty() {
            log::info!("Resolving {} referenced account(s)", missing.len());
        }

        let mut fetched = HashMap::with_capacity(missing.len());
        for id in missing {
            match self.resolver.resolve(&id).await {
                Ok(mut record) => {
                    if record.id != id {
                        log::warn!(
                            "Resolver returned account {} for id {}; keeping requested id",
                            record.id,
                            id
                        );
                        record.id = id.clone();
                    }
                    fetched.insert(id, record);
                }
                Err(e) if e.is_not_found() => {
                    log::warn!("Skipping edges to unresolvable account {}: {}", id, e);
                    report.skipped_ids.push(id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(fetched)
    }
}

/// Ids referenced by `records` that are neither graph nodes nor input
/// records, in first-reference order (friends before followers).
fn missing_ids(graph: &RelationshipGraph, records: &[AccountRecord]) -> Vec<AccountId> {
    let input_ids: HashSet<&AccountId> = records.iter().map(|r| &r.id).collect();
    let mut firsts: HashSet<&AccountId> = HashSet::new();
    let mut seen: HashSet<&AccountId> = HashSet::new();
    let mut missing = Vec::new();

    for record in records {
        if !firsts.insert(&record.id) {
            continue;
        }
        for other in record.friends.iter().chain(record.followers.iter()) {
            if other == &record.id
                || graph.contains(other)
                || input_ids.contains(other)
                || !seen.insert(other)
            {
                continue;
            }
            missing.push(other.clone());
        }
    }

    missing
}

fn insert_all(
    graph: &mut RelationshipGraph,
    records: Vec<AccountRecord>,
    mut fetched: HashMap<AccountId, AccountRecord>,
    report: &mut BuildReport,
) -> Result<()> {
    // Input nodes go in first so edges between input records never depend
    // on input order.
    let mut relations = Vec::with_capacity(records.len());
    let mut batch_ids: HashSet<AccountId> = HashSet::with_capacity(records.len());
    for record in records {
        if !batch_ids.insert(record.id.clone()) {
            log::warn!("Duplicate input record for account {}, ignoring it", record.id);
            report.duplicate_records += 1;
            continue;
        }
        relations.push((
            record.id.clone(),
            record.friends.clone(),
            record.followers.clone(),
        ));
        let id = record.id.clone();
        if graph.insert_node(record) {
            report.input_nodes += 1;
        } else {
            log::debug!("Account {} already in graph, keeping existing record", id);
        }
    }

    for (id, friends, followers) in relations {
        for friend in &friends {
            if ensure_node(graph, &id, friend, &mut fetched, report) {
                report.edges_added += usize::from(graph.add_edge(&id, friend)?);
            }
        }
        for follower in &followers {
            if ensure_node(graph, &id, follower, &mut fetched, report) {
                report.edges_added += usize::from(graph.add_edge(follower, &id)?);
            }
        }
    }

    Ok(())
}

/// Make sure `other` has a node before an edge to or from `owner` is added.
/// False means the edge must be skipped.
fn ensure_node(
    graph: &mut RelationshipGraph,
    owner: &AccountId,
    other: &AccountId,
    fetched: &mut HashMap<AccountId, AccountRecord>,
    report: &mut BuildReport,
) -> bool {
    if other == owner {
        log::warn!("Account {} lists itself as a relation, ignoring", owner);
        report.self_references += 1;
        return false;
    }
    if graph.contains(other) {
        return true;
    }
    match fetched.remove(other) {
        Some(record) => {
            graph.insert_node(record);
            report.resolved_nodes += 1;
            true
        }
        // Unresolvable, already reported during the fetch phase
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TagspreadError;
    use crate::resolver::MemoryResolver;
    use async_trait::async_trait;

    fn id(n: u64) -> AccountId {
        AccountId::from(n)
    }

    /// Resolver that is always rate limited
    struct RateLimited;

    #[async_trait]
    impl AccountResolver for RateLimited {
        async fn resolve(&self, id: &AccountId) -> Result<AccountRecord> {
            Err(TagspreadError::TransientFetch(format!("429 for {}", id)))
        }

        async fn resolve_by_handle(&self, handle: &str) -> Result<AccountRecord> {
            Err(TagspreadError::TransientFetch(format!("429 for {}", handle)))
        }
    }

    #[tokio::test]
    async fn test_build_friend_and_follower_edges() {
        let resolver = MemoryResolver::default();
        let records = vec![
            AccountRecord::new(1u64, "a").with_friends([2u64]),
            AccountRecord::new(2u64, "b").with_followers([1u64, 3u64]),
            AccountRecord::new(3u64, "c"),
        ];
        let (graph, report) = GraphBuilder::new(&resolver).build(records).await.unwrap();

        assert_eq!(graph.len(), 3);
        assert!(graph.has_edge(&id(1), &id(2)));
        assert!(graph.has_edge(&id(3), &id(2)));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(report.input_nodes, 3);
        assert_eq!(report.edges_added, 2);
        assert_eq!(resolver.lookups(), 0);
    }

    #[tokio::test]
    async fn test_build_resolves_missing_endpoints_once() {
        let resolver = MemoryResolver::new([
            AccountRecord::new(10u64, "outsider").with_friends([99u64, 98u64]),
        ]);
        let records = vec![
            AccountRecord::new(1u64, "a").with_friends([10u64]),
            AccountRecord::new(2u64, "b").with_followers([10u64]),
        ];
        let (graph, report) = GraphBuilder::new(&resolver).build(records).await.unwrap();

        assert_eq!(resolver.lookups(), 1);
        assert_eq!(report.resolved_nodes, 1);
        assert!(graph.has_edge(&id(1), &id(10)));
        assert!(graph.has_edge(&id(10), &id(2)));
        // the resolved node's own relations are not expanded
        assert!(!graph.contains(&id(99)));
        assert_eq!(graph.len(), 3);
        let order: Vec<_> = graph.node_ids().cloned().collect();
        assert_eq!(order, vec![id(1), id(2), id(10)]);
    }

    #[tokio::test]
    async fn test_input_records_are_never_fetched() {
        let resolver = MemoryResolver::new([AccountRecord::new(2u64, "stale")]);
        let records = vec![
            AccountRecord::new(1u64, "a").with_friends([2u64]),
            AccountRecord::new(2u64, "fresh"),
        ];
        let (graph, _) = GraphBuilder::new(&resolver).build(records).await.unwrap();

        assert_eq!(resolver.lookups(), 0);
        assert_eq!(graph.node(&id(2)).unwrap().handle, "fresh");
        assert!(graph.has_edge(&id(1), &id(2)));
    }

    #[tokio::test]
    async fn test_unresolvable_ids_are_skipped() {
        let resolver = MemoryResolver::default();
        let records = vec![AccountRecord::new(1u64, "a")
            .with_friends([404u64])
            .with_followers([405u64])];
        let (graph, report) = GraphBuilder::new(&resolver).build(records).await.unwrap();

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(report.skipped_ids, vec![id(404), id(405)]);
    }

    #[tokio::test]
    async fn test_self_references_never_become_edges() {
        let resolver = MemoryResolver::default();
        let records = vec![AccountRecord::new(1u64, "narcissist")
            .with_friends([1u64])
            .with_followers([1u64])];
        let (graph, report) = GraphBuilder::new(&resolver).build(records).await.unwrap();

        assert_eq!(graph.edge_count(), 0);
        assert_eq!(report.self_references, 2);
        assert_eq!(resolver.lookups(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_aborts_before_insertion() {
        let records = vec![
            AccountRecord::new(1u64, "a").with_friends([2u64]),
        ];
        let mut graph = RelationshipGraph::new();
        let err = GraphBuilder::new(&RateLimited)
            .extend(&mut graph, records)
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let resolver = MemoryResolver::new([AccountRecord::new(3u64, "c")]);
        let records = vec![
            AccountRecord::new(1u64, "a").with_friends([2u64, 3u64]),
            AccountRecord::new(2u64, "b").with_followers([1u64, 404u64]),
        ];
        let builder = GraphBuilder::new(&resolver);
        let (mut graph, _) = builder.build(records.clone()).await.unwrap();
        let nodes_before: Vec<_> = graph.node_ids().cloned().collect();
        let edges_before: HashSet<_> = graph
            .edges()
            .map(|(a, b)| (a.clone(), b.clone()))
            .collect();

        let report = builder.extend(&mut graph, records).await.unwrap();

        let nodes_after: Vec<_> = graph.node_ids().cloned().collect();
        let edges_after: HashSet<_> = graph
            .edges()
            .map(|(a, b)| (a.clone(), b.clone()))
            .collect();
        assert_eq!(nodes_before, nodes_after);
        assert_eq!(edges_before, edges_after);
        assert_eq!(report.input_nodes, 0);
        assert_eq!(report.resolved_nodes, 0);
        assert_eq!(report.edges_added, 0);
    }

    #[tokio::test]
    async fn test_duplicate_input_record_adds_no_edges() {
        let resolver = MemoryResolver::new([AccountRecord::new(3u64, "c")]);
        let records = vec![
            AccountRecord::new(1u64, "a"),
            AccountRecord::new(2u64, "b"),
            AccountRecord::new(1u64, "a_again").with_friends([2u64, 3u64]),
        ];
        let (graph, report) = GraphBuilder::new(&resolver).build(records).await.unwrap();

        assert_eq!(report.duplicate_records, 1);
        assert_eq!(graph.node(&id(1)).unwrap().handle, "a");
        assert!(graph.node(&id(1)).unwrap().friends.is_empty());
        assert!(!graph.has_edge(&id(1), &id(2)));
        assert_eq!(graph.edge_count(), 0);
        // ids only the duplicate mentions are not fetched either
        assert_eq!(resolver.lookups(), 0);
        assert!(!graph.contains(&id(3)));
    }

    #[tokio::test]
    async fn test_every_edge_endpoint_is_a_node() {
        let resolver = MemoryResolver::new([
            AccountRecord::new(20u64, "x"),
            AccountRecord::new(21u64, "y"),
        ]);
        let records = vec![
            AccountRecord::new(1u64, "a").with_friends([20u64, 500u64, 2u64]),
            AccountRecord::new(2u64, "b").with_followers([21u64, 501u64, 1u64]),
        ];
        let (graph, _) = GraphBuilder::new(&resolver).build(records).await.unwrap();

        for (from, to) in graph.edges() {
            assert!(graph.contains(from), "dangling source {}", from);
            assert!(graph.contains(to), "dangling target {}", to);
            assert_ne!(from, to);
        }
        // 1->20, 1->2, 21->2; the follower entry for 1 repeats 1->2
        assert_eq!(graph.edge_count(), 3);
    }
}
