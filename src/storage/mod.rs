//! SQLite storage for harvested records.
//!
//! Every insert is skip-on-conflict: an existing row is never updated.

mod schema;

use schema::SCHEMA;

use rusqlite::{params, Connection};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::records::{CommentRecord, PullRequestRecord};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to encode column as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of one batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub inserted: usize,
    /// Rows whose unique key already existed
    pub skipped: usize,
}

impl InsertSummary {
    fn record(&mut self, changed: usize) {
        if changed == 0 {
            self.skipped += 1;
        } else {
            self.inserted += changed;
        }
    }
}

/// Database connection wrapper. The connection closes on drop.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert pull requests keyed by `pr_number`, all in one transaction.
    pub fn insert_pull_requests(
        &mut self,
        records: &[PullRequestRecord],
    ) -> Result<InsertSummary, StorageError> {
        let tx = self.conn.transaction()?;
        let mut summary = InsertSummary::default();
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO pull_requests (pr_number, owner, title, description, conversation, files_modified)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT (pr_number) DO NOTHING
                "#,
            )?;
            for record in records {
                let changed = stmt.execute(params![
                    record.pr_number as i64,
                    record.owner,
                    record.title,
                    record.description,
                    serde_json::to_string(&record.conversation)?,
                    serde_json::to_string(&record.file_names())?,
                ])?;
                summary.record(changed);
            }
        }
        tx.commit()?;
        debug!(inserted = summary.inserted, skipped = summary.skipped, "stored pull requests");
        Ok(summary)
    }

    /// Insert comment records keyed by `file_name`, all in one transaction.
    pub fn insert_source_comments(
        &mut self,
        records: &[CommentRecord],
    ) -> Result<InsertSummary, StorageError> {
        let tx = self.conn.transaction()?;
        let mut summary = InsertSummary::default();
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO source_code (file_name, comments)
                VALUES (?1, ?2)
                ON CONFLICT (file_name) DO NOTHING
                "#,
            )?;
            for record in records {
                let changed = stmt.execute(params![
                    record.file_name,
                    serde_json::to_string(&record.comments)?,
                ])?;
                summary.record(changed);
            }
        }
        tx.commit()?;
        debug!(inserted = summary.inserted, skipped = summary.skipped, "stored source comments");
        Ok(summary)
    }

    /// Number of rows currently in `table`.
    pub fn count_rows(&self, table: Table) -> Result<usize, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    PullRequests,
    SourceCode,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::PullRequests => "pull_requests",
            Table::SourceCode => "source_code",
        }
    }
}
