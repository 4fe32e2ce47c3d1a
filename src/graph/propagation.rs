//! Tag propagation: one hop per pass.
//!
//! A node inherits the tags of the accounts it follows. Each pass reads the
//! tags every node had before the pass started and only then writes the
//! results back, so the outcome does not depend on node order and a tag
//! never travels more than one edge per pass.

use rayon::prelude::*;

use super::RelationshipGraph;
use crate::account::TagSet;
use crate::error::{Result, TagspreadError};

/// Outcome of a single pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// 1-based pass number over the graph's lifetime
    pub pass: usize,
    pub nodes_changed: usize,
    pub tags_added: usize,
}

impl PassReport {
    /// A pass that changed nothing; any further pass is a no-op as well.
    pub fn is_fixpoint(&self) -> bool {
        self.nodes_changed == 0
    }
}

/// Run one propagation pass over the whole graph.
///
/// Fails with [`TagspreadError::DanglingReference`] if an edge names an
/// account with no node, which means the graph was built incorrectly. The
/// graph is left untouched in that case.
pub fn propagate(graph: &mut RelationshipGraph) -> Result<PassReport> {
    let inherited = {
        let frozen: &RelationshipGraph = graph;
        (0..frozen.nodes.len())
            .into_par_iter()
            .map(|i| inherited_tags(frozen, i))
            .collect::<Result<Vec<TagSet>>>()?
    };

    graph.passes_applied += 1;
    let mut report = PassReport {
        pass: graph.passes_applied,
        ..PassReport::default()
    };

    for (record, tags) in graph.nodes.iter_mut().zip(inherited.iter()) {
        let added = record.tags.union_with(tags);
        if added > 0 {
            log::debug!("Account {} gained {} tag(s)", record.id, added);
            report.nodes_changed += 1;
            report.tags_added += added;
        }
    }

    log::info!(
        "Propagation pass {}: {} node(s) changed, {} tag(s) added",
        report.pass,
        report.nodes_changed,
        report.tags_added
    );
    Ok(report)
}

/// Run up to `max_passes` passes, stopping early at a fixpoint when
/// `stop_at_fixpoint` is set.
pub fn propagate_passes(
    graph: &mut RelationshipGraph,
    max_passes: usize,
    stop_at_fixpoint: bool,
) -> Result<Vec<PassReport>> {
    let mut reports = Vec::with_capacity(max_passes);
    for _ in 0..max_passes {
        let report = propagate(graph)?;
        reports.push(report);
        if stop_at_fixpoint && report.is_fixpoint() {
            log::info!("Tags reached a fixpoint after {} pass(es)", reports.len());
            break;
        }
    }
    Ok(reports)
}

/// Union of the tags of every account node `i` follows.
fn inherited_tags(graph: &RelationshipGraph, i: usize) -> Result<TagSet> {
    let mut tags = TagSet::new();
    for friend in &graph.follows[i] {
        let &j = graph
            .index
            .get(friend)
            .ok_or_else(|| TagspreadError::DanglingReference {
                node: graph.nodes[i].id.to_string(),
                missing: friend.to_string(),
            })?;
        tags.union_with(&graph.nodes[j].tags);
    }
    Ok(tags)
}
