//! Relationship graph: an arena of account records keyed by id, with
//! "follows" edges stored as adjacency lists of ids.
//!
//! The graph owns every record once built. Tags are read and written
//! through the accessors here; the builder, seed classifier and
//! propagation pass are the only writers.

mod builder;
mod propagation;

pub use builder::{BuildReport, GraphBuilder};
pub use propagation::{propagate, propagate_passes, PassReport};

use std::collections::{HashMap, HashSet};

use crate::account::{normalize_handle, AccountId, AccountRecord, TagSet};
use crate::error::{Result, TagspreadError};

/// Directed follow graph over account records.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    /// Node payloads in insertion order
    nodes: Vec<AccountRecord>,
    index: HashMap<AccountId, usize>,
    /// `follows[i]`: accounts node `i` follows, in insertion order
    follows: Vec<Vec<AccountId>>,
    /// `followed_by[i]`: accounts following node `i`
    followed_by: Vec<Vec<AccountId>>,
    edge_set: HashSet<(AccountId, AccountId)>,
    passes_applied: usize,
}

impl RelationshipGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_set.len()
    }

    pub fn contains(&self, id: &AccountId) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &AccountId) -> Option<&AccountRecord> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn tags(&self, id: &AccountId) -> Option<&TagSet> {
        self.node(id).map(|record| &record.tags)
    }

    /// Node ids in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = &AccountId> {
        self.nodes.iter().map(|record| &record.id)
    }

    pub fn records(&self) -> impl Iterator<Item = &AccountRecord> {
        self.nodes.iter()
    }

    /// Accounts `id` follows (its friends), as materialized edges
    pub fn friends_of(&self, id: &AccountId) -> &[AccountId] {
        self.index
            .get(id)
            .map(|&i| self.follows[i].as_slice())
            .unwrap_or(&[])
    }

    /// Accounts following `id`, as materialized edges
    pub fn followers_of(&self, id: &AccountId) -> &[AccountId] {
        self.index
            .get(id)
            .map(|&i| self.followed_by[i].as_slice())
            .unwrap_or(&[])
    }

    pub fn has_edge(&self, from: &AccountId, to: &AccountId) -> bool {
        self.edge_set.contains(&(from.clone(), to.clone()))
    }

    /// Every `(follower, followee)` edge, grouped by follower in node order
    pub fn edges(&self) -> impl Iterator<Item = (&AccountId, &AccountId)> {
        self.nodes
            .iter()
            .zip(self.follows.iter())
            .flat_map(|(record, targets)| targets.iter().map(move |to| (&record.id, to)))
    }

    /// First node whose handle matches, ignoring case and a leading `@`
    pub fn find_by_handle(&self, handle: &str) -> Option<&AccountId> {
        let wanted = normalize_handle(handle);
        self.nodes
            .iter()
            .find(|record| record.normalized_handle() == wanted)
            .map(|record| &record.id)
    }

    /// Number of propagation passes applied so far
    pub fn passes_applied(&self) -> usize {
        self.passes_applied
    }

    /// Number of nodes carrying at least one tag
    pub fn tagged_count(&self) -> usize {
        self.nodes.iter().filter(|r| !r.tags.is_empty()).count()
    }

    /// Copies of all records, with their current tags, for persistence
    pub fn to_records(&self) -> Vec<AccountRecord> {
        self.nodes.clone()
    }

    pub fn into_records(self) -> Vec<AccountRecord> {
        self.nodes
    }

    /// Add a node; returns false (and keeps the existing payload) if the id is taken.
    pub(crate) fn insert_node(&mut self, record: AccountRecord) -> bool {
        if self.index.contains_key(&record.id) {
            return false;
        }
        self.index.insert(record.id.clone(), self.nodes.len());
        self.nodes.push(record);
        self.follows.push(Vec::new());
        self.followed_by.push(Vec::new());
        true
    }

    /// Add `from -> to` ("from follows to").
    ///
    /// Returns `Ok(false)` for self-loops and edges already present. Both
    /// endpoints must already be nodes.
    pub(crate) fn add_edge(&mut self, from: &AccountId, to: &AccountId) -> Result<bool> {
        if from == to {
            return Ok(false);
        }
        let from_idx = self.require(from, to)?;
        let to_idx = self.require(to, from)?;

        if !self.edge_set.insert((from.clone(), to.clone())) {
            return Ok(false);
        }
        self.follows[from_idx].push(to.clone());
        self.followed_by[to_idx].push(from.clone());
        Ok(true)
    }

    /// Replace a node's tags. Returns the previous tags, or None if no such node.
    pub(crate) fn replace_tags(&mut self, id: &AccountId, tags: TagSet) -> Option<TagSet> {
        let &i = self.index.get(id)?;
        Some(std::mem::replace(&mut self.nodes[i].tags, tags))
    }

    fn require(&self, id: &AccountId, other_end: &AccountId) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| TagspreadError::DanglingReference {
                node: other_end.to_string(),
                missing: id.to_string(),
            })
    }
}
