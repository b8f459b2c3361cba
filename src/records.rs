//! Records produced by the pipelines. These are written verbatim to the JSON
//! checkpoint and, flattened, to one table row each.

use serde::{Deserialize, Serialize};

/// Comments extracted from one file, keyed by the file's name or path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub file_name: String,
    pub comments: Vec<String>,
}

/// A pull request with its conversation and the comments found in the
/// patches of its modified files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub pr_number: u64,
    /// Author login
    pub owner: String,
    pub title: String,
    pub description: Option<String>,
    /// Issue-thread comment bodies, oldest first
    pub conversation: Vec<String>,
    pub modified_files: Vec<CommentRecord>,
}

impl PullRequestRecord {
    /// Names of the modified files, as stored in the `files_modified` column.
    pub fn file_names(&self) -> Vec<&str> {
        self.modified_files
            .iter()
            .map(|f| f.file_name.as_str())
            .collect()
    }
}
