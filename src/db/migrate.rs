use rusqlite::{params, Connection};

use crate::error::{Result, TagspreadError};

/// Migration metadata
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

/// Compiled into the binary so runs don't depend on the working directory.
/// Versions must be strictly increasing.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_accounts",
        sql: include_str!("../../migrations/001_accounts.sql"),
    },
    Migration {
        version: 2,
        name: "002_runs",
        sql: include_str!("../../migrations/002_runs.sql"),
    },
];

/// Tables the current schema must contain
pub const EXPECTED_TABLES: &[&str] = &["accounts", "runs", "schema_migrations"];

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Names of applied migrations, oldest first
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
    Ok(names)
}

/// Run all pending migrations, each in its own transaction
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    ensure_migrations_table(conn)?;
    let applied = get_applied_migrations(conn)?;

    for migration in MIGRATIONS {
        if applied.iter().any(|name| name == migration.name) {
            log::debug!("Migration {} already applied, skipping", migration.name);
            continue;
        }

        log::info!("Applying migration: {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            TagspreadError::Config(format!("Failed to execute migration {}: {}", migration.name, e))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    Ok(())
}

/// Names of the tables in `EXPECTED_TABLES` that do not exist
pub fn missing_tables(conn: &Connection) -> Result<Vec<&'static str>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

    Ok(EXPECTED_TABLES
        .iter()
        .copied()
        .filter(|expected| !tables.iter().any(|t| t == expected))
        .collect())
}
