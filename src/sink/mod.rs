//! Persistence sink: the JSON checkpoint, then the database phase.
//!
//! The checkpoint is written first and does not depend on the database. A
//! database failure is reported but never fails the run.

use colored::Colorize;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::storage::{Database, InsertSummary, StorageError, Table};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write checkpoint file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result of the database phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseOutcome {
    Stored {
        summary: InsertSummary,
        total_rows: usize,
    },
    Failed(String),
}

/// Serialize records as a JSON array indented by four spaces.
pub fn checkpoint_json<T: Serialize>(records: &[T]) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    records.serialize(&mut ser)?;
    Ok(buf)
}

/// Write the full aggregate to `path`, replacing any previous file.
#[instrument(skip(records), fields(path = %path.display(), records = records.len()))]
pub fn write_checkpoint<T: Serialize>(path: &Path, records: &[T]) -> Result<(), SinkError> {
    let json = checkpoint_json(records)?;
    std::fs::write(path, json).map_err(|source| SinkError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("checkpoint written");
    Ok(())
}

/// Open the database at `db_path`, run `store` against it and report the
/// outcome. Errors are logged and returned as [`DatabaseOutcome::Failed`];
/// the connection is closed on every path.
#[instrument(skip(store), fields(db = %db_path.display(), table = table.name()))]
pub fn persist<F>(db_path: &Path, table: Table, store: F) -> DatabaseOutcome
where
    F: FnOnce(&mut Database) -> Result<InsertSummary, StorageError>,
{
    let result = Database::open(db_path).and_then(|mut db| {
        let summary = store(&mut db)?;
        let total_rows = db.count_rows(table)?;
        Ok(DatabaseOutcome::Stored {
            summary,
            total_rows,
        })
    });

    result.unwrap_or_else(|err| {
        error!(error = %err, "database phase failed");
        DatabaseOutcome::Failed(err.to_string())
    })
}

/// Print the end-of-run lines to the terminal.
pub fn print_summary(records: usize, checkpoint: &Path, outcome: &DatabaseOutcome) {
    println!(
        "{} {} records to {}",
        "Data saved:".green().bold(),
        records,
        checkpoint.display()
    );
    match outcome {
        DatabaseOutcome::Stored {
            summary,
            total_rows,
        } => println!(
            "{} {} inserted, {} already present ({} rows in table)",
            "Data inserted successfully:".green().bold(),
            summary.inserted,
            summary.skipped,
            total_rows
        ),
        DatabaseOutcome::Failed(reason) => {
            println!("{} {}", "An error occurred:".red().bold(), reason)
        }
    }
}
