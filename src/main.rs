mod config;
mod extract;
mod github;
mod pipeline;
mod pulls;
mod records;
mod sink;
mod sources;
mod storage;

use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::extract::{FileFilter, RuleTable};
use crate::github::{GitHubClient, GitHubError, RepoUrl};
use crate::pipeline::Pipeline;
use crate::pulls::{PullRequestPipeline, PullState};
use crate::sources::SourceCommentsPipeline;

/// comment-harvest: collect pull-request metadata and source-code comments
/// from a GitHub repository into a JSON file and a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "comment-harvest", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to .comment-harvest.toml in the current directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest pull requests, their conversations and the comments in their patches
    Pulls {
        #[command(flatten)]
        target: Target,

        /// Which pull requests to list
        #[arg(long, value_enum, default_value_t = PullState::Closed)]
        state: PullState,
    },

    /// Harvest comments from every supported source file in the repository
    Comments {
        #[command(flatten)]
        target: Target,
    },
}

#[derive(Args, Debug)]
struct Target {
    /// GitHub repository URL (e.g., https://github.com/org/repo). Prompted for when omitted.
    repo_url: Option<String>,

    /// GitHub access token. Falls back to the config file, GITHUB_TOKEN, then a prompt.
    #[arg(long)]
    token: Option<String>,

    /// JSON checkpoint path (defaults to a per-pipeline name in the output dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = Config::load(cli.config.as_deref())?;
    let extensions = config.extraction.extensions.as_deref();

    match cli.command {
        Command::Pulls { target, state } => {
            let repo = resolve_repo(&target)?;
            let mut filter = FileFilter::pull_requests();
            if let Some(extensions) = extensions {
                filter = filter.with_extensions(extensions);
            }
            let rules = RuleTable::pull_requests().with_overrides(&config.extraction.pull_requests);
            let pipeline = PullRequestPipeline::new(repo, state, filter, rules);
            execute(&pipeline, &target, &config).await
        }
        Command::Comments { target } => {
            let repo = resolve_repo(&target)?;
            let mut filter = FileFilter::source_files();
            if let Some(extensions) = extensions {
                filter = filter.with_extensions(extensions);
            }
            let rules = RuleTable::source_files().with_overrides(&config.extraction.source_files);
            let pipeline = SourceCommentsPipeline::new(repo, filter, rules);
            execute(&pipeline, &target, &config).await
        }
    }
}

/// Parse the repository URL, prompting for it when not given. Runs before any
/// network call so a malformed URL fails immediately.
fn resolve_repo(target: &Target) -> Result<RepoUrl, Box<dyn std::error::Error>> {
    let url = match &target.repo_url {
        Some(url) => url.clone(),
        None => prompt("Enter the GitHub repository URL: ")?,
    };
    let repo = github::parse_repo_url(&url)?;
    debug!(owner = %repo.owner, repo = %repo.repo, "parsed repository URL");
    Ok(repo)
}

fn resolve_token(target: &Target, config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    let token = match target.token.clone().or_else(|| config.github_token()) {
        Some(token) => token,
        None => prompt("Enter your GitHub access token: ")?,
    };
    if token.trim().is_empty() {
        return Err(GitHubError::MissingToken.into());
    }
    Ok(token.trim().to_string())
}

fn prompt(message: &str) -> io::Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn execute<P: Pipeline>(
    pipeline: &P,
    target: &Target,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = resolve_token(target, config)?;

    let client = GitHubClient::new(&config.github.api_url, token, config.retry_policy());
    let checkpoint = target
        .output
        .clone()
        .unwrap_or_else(|| config.output.dir.join(pipeline.output_file_name()));
    let database = target
        .database
        .clone()
        .unwrap_or_else(|| config.database.path.clone());

    let summary = pipeline::run(pipeline, &client, &checkpoint, &database).await?;
    sink::print_summary(summary.records, &summary.checkpoint, &summary.database);
    info!(records = summary.records, "done");
    Ok(())
}
