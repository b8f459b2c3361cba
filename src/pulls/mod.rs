//! Pull-request pipeline: list pull requests page by page, then assemble one
//! record per pull request from its metadata, conversation and file patches.

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::extract::{FileFilter, RuleTable};
use crate::github::types::{IssueComment, PullDetail, PullFile, PullSummary};
use crate::github::{GitHubClient, GitHubError, RepoUrl};
use crate::pipeline::Pipeline;
use crate::records::{CommentRecord, PullRequestRecord};
use crate::storage::{Database, InsertSummary, StorageError, Table};

pub const PAGE_SIZE: u32 = 100;

/// Which pull requests to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PullState {
    Open,
    #[default]
    Closed,
    All,
}

impl PullState {
    pub fn as_str(self) -> &'static str {
        match self {
            PullState::Open => "open",
            PullState::Closed => "closed",
            PullState::All => "all",
        }
    }
}

/// List every pull request in `state`, requesting numbered pages of
/// [`PAGE_SIZE`] from page 1 until a page comes back empty.
#[instrument(skip(client), fields(owner = %repo.owner, repo = %repo.repo))]
pub async fn list_pull_requests(
    client: &GitHubClient,
    repo: &RepoUrl,
    state: PullState,
) -> Result<Vec<PullSummary>, GitHubError> {
    let url = client.endpoint(&format!("repos/{}/{}/pulls", repo.owner, repo.repo));
    let mut pulls = Vec::new();
    let mut page = 1u32;
    loop {
        let query = [
            ("state", state.as_str().to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("page", page.to_string()),
        ];
        let batch: Vec<PullSummary> = client.get_json(&url, &query).await?;
        debug!(page, items = batch.len(), "fetched pull request page");
        if batch.is_empty() {
            break;
        }
        pulls.extend(batch);
        page += 1;
    }
    Ok(pulls)
}

/// Fetch one pull request's metadata, issue-thread comments and modified
/// files, extracting comments from the patch of every file the filter accepts.
/// Files without a patch are skipped.
#[instrument(skip(client, filter, rules), fields(owner = %repo.owner, repo = %repo.repo))]
pub async fn fetch_pull_request_details(
    client: &GitHubClient,
    repo: &RepoUrl,
    number: u64,
    filter: &FileFilter,
    rules: &RuleTable,
) -> Result<PullRequestRecord, GitHubError> {
    let base = format!("repos/{}/{}", repo.owner, repo.repo);
    let page_size = [("per_page", PAGE_SIZE.to_string())];

    let detail: PullDetail = client
        .get_json(&client.endpoint(&format!("{base}/pulls/{number}")), &[])
        .await?;

    let conversation: Vec<String> = client
        .get_all_linked::<IssueComment>(
            &client.endpoint(&format!("{base}/issues/{number}/comments")),
            &page_size,
        )
        .await?
        .into_iter()
        .map(|comment| comment.body)
        .collect();

    let files: Vec<PullFile> = client
        .get_all_linked(
            &client.endpoint(&format!("{base}/pulls/{number}/files")),
            &page_size,
        )
        .await?;
    debug!(files = files.len(), comments = conversation.len(), "fetched pull request details");

    let modified_files = files
        .into_iter()
        .filter(|file| filter.accepts(&file.filename))
        .filter_map(|file| {
            let patch = file.patch?;
            Some(CommentRecord {
                comments: rules.extract(&file.filename, &patch),
                file_name: file.filename,
            })
        })
        .collect();

    Ok(PullRequestRecord {
        pr_number: detail.number,
        owner: detail.user.login,
        title: detail.title,
        description: detail.body,
        conversation,
        modified_files,
    })
}

/// Harvests every pull request of one repository.
pub struct PullRequestPipeline {
    repo: RepoUrl,
    state: PullState,
    filter: FileFilter,
    rules: RuleTable,
}

impl PullRequestPipeline {
    pub fn new(repo: RepoUrl, state: PullState, filter: FileFilter, rules: RuleTable) -> Self {
        Self {
            repo,
            state,
            filter,
            rules,
        }
    }
}

#[async_trait]
impl Pipeline for PullRequestPipeline {
    type Record = PullRequestRecord;

    fn name(&self) -> &str {
        "pull requests"
    }

    fn output_file_name(&self) -> String {
        format!("{}_pr_details.json", self.repo.repo)
    }

    fn table(&self) -> Table {
        Table::PullRequests
    }

    async fn collect(&self, client: &GitHubClient) -> Result<Vec<PullRequestRecord>, GitHubError> {
        let pulls = list_pull_requests(client, &self.repo, self.state).await?;
        info!(
            count = pulls.len(),
            state = self.state.as_str(),
            scope = %self.rules.scope(),
            "listed pull requests"
        );

        let mut records = Vec::with_capacity(pulls.len());
        for pull in pulls {
            info!("Fetching details for PR #{}...", pull.number);
            let record = fetch_pull_request_details(
                client,
                &self.repo,
                pull.number,
                &self.filter,
                &self.rules,
            )
            .await?;
            records.push(record);
        }
        Ok(records)
    }

    fn store(
        &self,
        db: &mut Database,
        records: &[PullRequestRecord],
    ) -> Result<InsertSummary, StorageError> {
        db.insert_pull_requests(records)
    }
}
