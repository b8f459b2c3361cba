use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, info_span, Instrument};

use crate::github::{GitHubClient, GitHubError};
use crate::sink::{self, DatabaseOutcome, SinkError};
use crate::storage::{Database, InsertSummary, StorageError, Table};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// A harvest that enumerates items on GitHub, turns them into records and
/// knows where those records are stored.
#[async_trait]
pub trait Pipeline: Send + Sync {
    type Record: Serialize + Send + Sync;

    /// Human-readable name used in logs
    fn name(&self) -> &str;

    /// Default file name of the JSON checkpoint
    fn output_file_name(&self) -> String;

    /// Destination table
    fn table(&self) -> Table;

    /// Fetch everything from the API. Any failed request aborts the run.
    async fn collect(&self, client: &GitHubClient) -> Result<Vec<Self::Record>, GitHubError>;

    /// Insert the records, skipping existing keys.
    fn store(
        &self,
        db: &mut Database,
        records: &[Self::Record],
    ) -> Result<InsertSummary, StorageError>;
}

#[derive(Debug)]
pub struct RunSummary {
    pub records: usize,
    pub checkpoint: PathBuf,
    pub database: DatabaseOutcome,
}

/// Collect, checkpoint to JSON, then store. Network and checkpoint errors are
/// fatal; database errors end up in [`RunSummary::database`].
pub async fn run<P: Pipeline>(
    pipeline: &P,
    client: &GitHubClient,
    checkpoint: &Path,
    database: &Path,
) -> Result<RunSummary, PipelineError> {
    let span = info_span!("pipeline", name = pipeline.name());
    async move {
        let records = pipeline.collect(client).await?;
        info!(records = records.len(), "collected records");

        sink::write_checkpoint(checkpoint, &records)?;
        info!(path = %checkpoint.display(), "Data saved");

        let outcome = sink::persist(database, pipeline.table(), |db| {
            pipeline.store(db, &records)
        });

        Ok(RunSummary {
            records: records.len(),
            checkpoint: checkpoint.to_path_buf(),
            database: outcome,
        })
    }
    .instrument(span)
    .await
}
