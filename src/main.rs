use anyhow::Result;
use clap::{Parser, Subcommand};
use tagspread::config::Config;
use tagspread::db::{self, migrate, Db};
use tagspread::error::TagspreadError;
use tagspread::pipeline::{self, RunInput};
use tagspread::rank::rank;
use tagspread::resolver::{AccountResolver, CachingResolver, HttpResolver, MemoryResolver};

#[derive(Parser, Debug)]
#[command(name = "tagspread")]
#[command(about = "Tag accounts in a follow graph from a handful of curated reference accounts")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check the configuration and the database schema (default)
    Verify,
    /// Build the graph, seed it, propagate tags and save the result
    Run {
        /// Curated list URL whose members form the input (repeatable).
        /// Without any, the records saved by the previous run are used.
        #[arg(long = "list", value_name = "URL")]
        lists: Vec<String>,
        /// Number of propagation passes (overrides propagation.passes)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        passes: Option<u64>,
        /// Resolve accounts from stored records only; no API calls
        #[arg(long, conflicts_with = "lists")]
        offline: bool,
    },
    /// Print the most followed reference accounts per category
    Rank {
        /// Use follower lists of stored records instead of the API
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();

    match args.command.unwrap_or(Command::Verify) {
        Command::Verify => run_schema_verification().await?,
        Command::Run {
            lists,
            passes,
            offline,
        } => run_pipeline(lists, passes, offline).await?,
        Command::Rank { offline } => run_ranking(offline).await?,
    }

    Ok(())
}

/// Open the configured store and bring its schema up to date
async fn open_db(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    db.migrate().await?;
    log::info!("Database ready at {}", config.db_path().display());
    Ok(db)
}

/// The platform API behind an LRU cache, or stored records when offline
async fn build_resolver(config: &Config, db: &Db, offline: bool) -> Result<Box<dyn AccountResolver>> {
    if offline {
        let records = db::load_records(db).await?;
        log::info!("Offline mode: resolving from {} stored record(s)", records.len());
        return Ok(Box::new(MemoryResolver::new(records)));
    }

    let http = HttpResolver::new(&config.api, config.bearer_token()?)?;
    if config.api.cache_capacity > 0 {
        Ok(Box::new(CachingResolver::new(http, config.api.cache_capacity)))
    } else {
        Ok(Box::new(http))
    }
}

async fn run_pipeline(lists: Vec<String>, passes: Option<u64>, offline: bool) -> Result<()> {
    let mut config = if offline {
        Config::load_offline()?
    } else {
        Config::load()?
    };
    if let Some(passes) = passes {
        config.propagation.passes = passes as usize;
    }

    let db = open_db(&config).await?;
    let resolver = build_resolver(&config, &db, offline).await?;

    let input = if lists.is_empty() {
        RunInput::Stored
    } else {
        RunInput::Lists(lists)
    };
    let records = pipeline::load_input(&input, resolver.as_ref(), &db).await?;
    if records.is_empty() {
        anyhow::bail!("No input accounts. Pass --list URL or run once with a list first.");
    }

    let summary = pipeline::run(
        records,
        &config.reference_accounts,
        &config.propagation,
        resolver.as_ref(),
        &db,
    )
    .await?;

    println!("\n=== Tagspread Run ===\n");
    println!("{:<28} {:>10}", "Accounts", summary.total_nodes);
    println!("{:<28} {:>10}", "Follow edges", summary.total_edges);
    println!("{:<28} {:>10}", "Resolved during build", summary.build.resolved_nodes);
    println!("{:<28} {:>10}", "Unresolvable ids", summary.build.skipped_ids.len());
    println!("{:<28} {:>10}", "Seeded", summary.seed.seeded.len());
    println!("{:<28} {:>10}", "Seeds not found", summary.seed.missing.len());
    println!("{:<28} {:>10}", "Passes", summary.passes.len());
    println!("{:<28} {:>10}", "Tagged accounts", summary.tagged_nodes);
    println!("{:<28} {:>10}", "Saved", summary.saved);

    for handle in &summary.seed.missing {
        println!("  missing seed: @{}", handle);
    }
    for conflict in &summary.seed.conflicts {
        println!(
            "  conflicting seed @{}: {:?} replaced by {:?}",
            conflict.handle,
            conflict.overwritten.to_vec(),
            conflict.applied.to_vec()
        );
    }
    println!();

    Ok(())
}

async fn run_ranking(offline: bool) -> Result<()> {
    let config = if offline {
        Config::load_offline()?
    } else {
        Config::load()?
    };
    let taxonomy = config.taxonomy()?;
    let db = open_db(&config).await?;
    let resolver = build_resolver(&config, &db, offline).await?;

    let ranking = rank(&config.reference_accounts, &taxonomy, resolver.as_ref()).await?;

    if ranking.is_empty() {
        println!("No reference accounts to rank.");
        return Ok(());
    }

    for (category, accounts) in &ranking {
        println!("\n{}", category);
        println!("{:-<40}", "");
        println!("{:<4} {:<20} {:>14}", "#", "Handle", "Followers");
        for (position, account) in accounts.iter().enumerate() {
            println!(
                "{:<4} {:<20} {:>14}",
                position + 1,
                format!("@{}", account.handle.trim_start_matches('@')),
                account.follower_count
            );
        }
    }
    println!();

    Ok(())
}

/// Run database schema verification
async fn run_schema_verification() -> Result<()> {
    log::info!("Starting Tagspread v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load_offline()?;
    let taxonomy = config.taxonomy()?;
    log::info!("Configuration loaded successfully");
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Categories: {}", taxonomy.names().join(", "));
    log::info!("Reference accounts: {}", config.reference_accounts.len());

    let db = open_db(&config).await?;

    db.with_connection(|conn| {
        let missing = migrate::missing_tables(conn)?;
        for table in &missing {
            log::error!("Missing table: {}", table);
        }
        if !missing.is_empty() {
            return Err(TagspreadError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::get_applied_migrations(conn)?;
        log::debug!("✓ {} migrations applied: {}", applied.len(), applied.join(", "));

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(TagspreadError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }
        log::debug!("✓ Journal mode: WAL");

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(TagspreadError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    let stored = db::count_records(&db).await?;
    log::info!("Stored accounts: {}", stored);
    if let Some(last) = db::recent_runs(&db, 1).await?.into_iter().next() {
        log::info!(
            "Last run finished {}: {} of {} account(s) tagged",
            last.finished_at,
            last.tagged_nodes,
            last.nodes
        );
    }

    log::info!("✓ Database schema verification complete");
    Ok(())
}
