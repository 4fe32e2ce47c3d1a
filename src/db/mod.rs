//! SQLite record store.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tokio::task;

use crate::error::{Result, TagspreadError};

pub mod migrate;
pub mod store;

pub use store::{
    count_records, load_records, record_run, recent_runs, save_records, save_run, RunLog,
};

/// WAL for concurrent readers, NORMAL sync for bulk upserts
const PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
                       PRAGMA synchronous = NORMAL; \
                       PRAGMA foreign_keys = ON; \
                       PRAGMA temp_store = MEMORY;";

/// Database connection wrapper
pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new connection with the store's pragmas applied
    pub fn open_connection(&self) -> Result<Connection> {
        open(&self.path)
    }

    /// Execute a closure with a database connection in a blocking task
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = open(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            TagspreadError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("database task failed: {}", e),
            ))
        })?
    }

    /// Apply any pending migrations
    pub async fn migrate(&self) -> Result<()> {
        self.with_connection(|conn| migrate::run_migrations(conn)).await
    }
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(PRAGMAS)?;
    Ok(conn)
}
