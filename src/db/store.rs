//! Bulk persistence of account records and run history.

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::account::{AccountId, AccountRecord, TagSet};
use crate::db::Db;
use crate::error::{Result, TagspreadError};

/// Upsert all records in one transaction. Returns the number written.
pub async fn save_records(db: &Db, records: Vec<AccountRecord>) -> Result<usize> {
    if records.is_empty() {
        return Ok(0);
    }

    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let saved = upsert_records(&tx, &records)?;
        tx.commit()?;

        log::debug!("Saved {} account record(s)", saved);
        Ok(saved)
    })
    .await
}

/// Upsert the records of a finished run and its log row together.
/// Either both land or neither does.
pub async fn save_run(db: &Db, records: Vec<AccountRecord>, run: RunLog) -> Result<usize> {
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        let saved = upsert_records(&tx, &records)?;
        insert_run(&tx, &run)?;
        tx.commit()?;

        log::debug!("Saved {} account record(s) and the run log", saved);
        Ok(saved)
    })
    .await
}

fn upsert_records(conn: &Connection, records: &[AccountRecord]) -> Result<usize> {
    let updated_at = Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO accounts (
            id, handle, description, friends_json, followers_json, tags_json, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            handle = excluded.handle,
            description = excluded.description,
            friends_json = excluded.friends_json,
            followers_json = excluded.followers_json,
            tags_json = excluded.tags_json,
            updated_at = excluded.updated_at
        "#,
    )?;

    for record in records {
        stmt.execute(params![
            record.id.as_str(),
            record.handle,
            record.description,
            serde_json::to_string(&record.friends)?,
            serde_json::to_string(&record.followers)?,
            serde_json::to_string(&record.tags)?,
            updated_at,
        ])?;
    }

    Ok(records.len())
}

/// All stored records, in the order they were first saved
pub async fn load_records(db: &Db) -> Result<Vec<AccountRecord>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, handle, description, friends_json, followers_json, tags_json \
             FROM accounts ORDER BY rowid",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    })
    .await
}

pub async fn count_records(db: &Db) -> Result<usize> {
    db.with_connection(|conn| {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM accounts", [], |row| row.get(0))?;
        Ok(count as usize)
    })
    .await
}

fn record_from_row(row: &Row<'_>) -> Result<AccountRecord> {
    let id: String = row.get(0)?;
    let friends: Vec<AccountId> = parse_json_column(&id, "friends", row.get(3)?)?;
    let followers: Vec<AccountId> = parse_json_column(&id, "followers", row.get(4)?)?;
    let tags: TagSet = parse_json_column(&id, "tags", row.get(5)?)?;

    Ok(AccountRecord {
        id: AccountId::new(id),
        handle: row.get(1)?,
        description: row.get(2)?,
        friends,
        followers,
        tags,
    })
}

fn parse_json_column<T: serde::de::DeserializeOwned>(id: &str, column: &str, raw: String) -> Result<T> {
    serde_json::from_str(&raw).map_err(|e| {
        TagspreadError::InvalidInput(format!("account {}: corrupt {} column: {}", id, column, e))
    })
}

/// One pipeline run, as recorded in the `runs` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLog {
    pub started_at: String,
    pub finished_at: String,
    pub nodes: usize,
    pub edges: usize,
    pub tagged_nodes: usize,
    pub passes: usize,
    pub skipped_ids: usize,
    pub missing_seeds: usize,
}

pub async fn record_run(db: &Db, run: RunLog) -> Result<()> {
    db.with_connection(move |conn| insert_run(conn, &run)).await
}

fn insert_run(conn: &Connection, run: &RunLog) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO runs (
            started_at, finished_at, nodes, edges, tagged_nodes, passes, skipped_ids, missing_seeds
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            run.started_at,
            run.finished_at,
            run.nodes as i64,
            run.edges as i64,
            run.tagged_nodes as i64,
            run.passes as i64,
            run.skipped_ids as i64,
            run.missing_seeds as i64,
        ],
    )?;
    Ok(())
}

/// Most recent runs first
pub async fn recent_runs(db: &Db, limit: usize) -> Result<Vec<RunLog>> {
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            "SELECT started_at, finished_at, nodes, edges, tagged_nodes, passes, skipped_ids, missing_seeds \
             FROM runs ORDER BY run_id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map([limit as i64], |row| {
                Ok(RunLog {
                    started_at: row.get(0)?,
                    finished_at: row.get(1)?,
                    nodes: row.get::<_, i64>(2)? as usize,
                    edges: row.get::<_, i64>(3)? as usize,
                    tagged_nodes: row.get::<_, i64>(4)? as usize,
                    passes: row.get::<_, i64>(5)? as usize,
                    skipped_ids: row.get::<_, i64>(6)? as usize,
                    missing_seeds: row.get::<_, i64>(7)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
        Ok(runs)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Db::new(temp_dir.path().join("test.db"));
        db.migrate().await.unwrap();
        (db, temp_dir)
    }

    fn sample_records() -> Vec<AccountRecord> {
        vec![
            AccountRecord::new(1u64, "alice")
                .with_description("home cook")
                .with_friends([2u64, 3u64])
                .with_tags(["food"]),
            AccountRecord::new(2u64, "bob").with_followers([1u64]),
        ]
    }

    #[tokio::test]
    async fn test_save_and_load_preserves_records() {
        let (db, _temp) = setup_test_db().await;
        let records = sample_records();

        assert_eq!(save_records(&db, records.clone()).await.unwrap(), 2);
        let loaded = load_records(&db).await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_save_upserts_by_id() {
        let (db, _temp) = setup_test_db().await;
        save_records(&db, sample_records()).await.unwrap();

        let updated = AccountRecord::new(1u64, "alice_renamed").with_tags(["food", "sports"]);
        save_records(&db, vec![updated.clone()]).await.unwrap();

        assert_eq!(count_records(&db).await.unwrap(), 2);
        let loaded = load_records(&db).await.unwrap();
        // keeps its original position
        assert_eq!(loaded[0], updated);
        assert_eq!(loaded[1].handle, "bob");
    }

    #[tokio::test]
    async fn test_save_empty_is_noop() {
        let (db, _temp) = setup_test_db().await;
        assert_eq!(save_records(&db, Vec::new()).await.unwrap(), 0);
        assert_eq!(count_records(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_json_column_is_reported() {
        let (db, _temp) = setup_test_db().await;
        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, handle, tags_json, updated_at) VALUES ('9', 'x', 'not json', '')",
                [],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        let err = load_records(&db).await.unwrap_err();
        assert!(err.to_string().contains("corrupt tags column"));
    }

    fn run_log(passes: usize) -> RunLog {
        RunLog {
            started_at: format!("t{}", passes),
            finished_at: format!("t{}", passes),
            nodes: 2,
            edges: 1,
            tagged_nodes: 1,
            passes,
            skipped_ids: 0,
            missing_seeds: 0,
        }
    }

    #[tokio::test]
    async fn test_save_run_writes_records_and_log() {
        let (db, _temp) = setup_test_db().await;

        assert_eq!(save_run(&db, sample_records(), run_log(1)).await.unwrap(), 2);
        assert_eq!(count_records(&db).await.unwrap(), 2);
        assert_eq!(recent_runs(&db, 5).await.unwrap(), vec![run_log(1)]);
    }

    #[tokio::test]
    async fn test_save_run_is_all_or_nothing() {
        let (db, _temp) = setup_test_db().await;
        db.with_connection(|conn| {
            conn.execute_batch("DROP TABLE runs")?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(save_run(&db, sample_records(), run_log(1)).await.is_err());
        assert_eq!(count_records(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_history_newest_first() {
        let (db, _temp) = setup_test_db().await;
        for passes in 1..=3 {
            record_run(
                &db,
                RunLog {
                    started_at: format!("t{}", passes),
                    finished_at: format!("t{}", passes),
                    nodes: 10,
                    edges: 20,
                    tagged_nodes: 5,
                    passes,
                    skipped_ids: 0,
                    missing_seeds: 0,
                },
            )
            .await
            .unwrap();
        }

        let runs = recent_runs(&db, 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].passes, 3);
        assert_eq!(runs[1].passes, 2);
    }
}
