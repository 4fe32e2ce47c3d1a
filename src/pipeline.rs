//! One end-to-end run: gather records, build, seed, propagate, persist.

use chrono::Utc;
use std::collections::HashSet;

use crate::account::{AccountRecord, ReferenceAccount};
use crate::config::PropagationConfig;
use crate::db::{self, Db, RunLog};
use crate::error::Result;
use crate::graph::{propagate_passes, BuildReport, GraphBuilder, PassReport};
use crate::resolver::{parse_list_url, AccountResolver};
use crate::seed::{seed, SeedReport};

/// Where a run takes its input records from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunInput {
    /// Members of these curated list URLs
    Lists(Vec<String>),
    /// Records saved by an earlier run
    Stored,
}

/// What a run did
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub build: BuildReport,
    pub seed: SeedReport,
    pub passes: Vec<PassReport>,
    pub saved: usize,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub tagged_nodes: usize,
}

/// Fetch the members of every list, keeping the first record seen per id.
pub async fn gather_list_members(
    resolver: &dyn AccountResolver,
    list_urls: &[String],
) -> Result<Vec<AccountRecord>> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for list_url in list_urls {
        let (owner, slug) = parse_list_url(list_url)?;
        let members = resolver.list_members(&owner, &slug).await?;
        log::info!("List {}/{} has {} member(s)", owner, slug, members.len());

        for member in members {
            if seen.insert(member.id.clone()) {
                records.push(member);
            }
        }
    }

    Ok(records)
}

/// Input records for a run
pub async fn load_input(
    input: &RunInput,
    resolver: &dyn AccountResolver,
    db: &Db,
) -> Result<Vec<AccountRecord>> {
    match input {
        RunInput::Lists(urls) => gather_list_members(resolver, urls).await,
        RunInput::Stored => {
            let records = db::load_records(db).await?;
            log::info!("Loaded {} stored record(s)", records.len());
            Ok(records)
        }
    }
}

/// Build the graph from `records`, seed it, propagate, then save every node
/// and log the run.
///
/// Nothing is written when any step fails.
pub async fn run(
    records: Vec<AccountRecord>,
    reference_accounts: &[ReferenceAccount],
    propagation: &PropagationConfig,
    resolver: &dyn AccountResolver,
    db: &Db,
) -> Result<RunSummary> {
    let started_at = Utc::now().to_rfc3339();

    let (mut graph, build) = GraphBuilder::new(resolver).build(records).await?;
    let seed_report = seed(&mut graph, reference_accounts, resolver).await?;
    let passes = propagate_passes(&mut graph, propagation.passes, propagation.until_fixpoint)?;

    let total_nodes = graph.len();
    let total_edges = graph.edge_count();
    let tagged_nodes = graph.tagged_count();

    let run_log = RunLog {
        started_at,
        finished_at: Utc::now().to_rfc3339(),
        nodes: total_nodes,
        edges: total_edges,
        tagged_nodes,
        passes: passes.len(),
        skipped_ids: build.skipped_ids.len(),
        missing_seeds: seed_report.missing.len(),
    };
    let saved = db::save_run(db, graph.into_records(), run_log).await?;

    log::info!(
        "Run complete: {} of {} account(s) tagged after {} pass(es)",
        tagged_nodes,
        total_nodes,
        passes.len()
    );

    Ok(RunSummary {
        build,
        seed: seed_report,
        passes,
        saved,
        total_nodes,
        total_edges,
        tagged_nodes,
    })
}
