//! Source-comments pipeline: walk the repository tree through the contents
//! API, fetch each accepted file and extract comments from its full text.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info, instrument, warn};

use crate::extract::{FileFilter, RuleTable};
use crate::github::types::{ContentEntry, EntryKind, FileContent};
use crate::github::{GitHubClient, GitHubError, RepoUrl};
use crate::pipeline::Pipeline;
use crate::records::CommentRecord;
use crate::storage::{Database, InsertSummary, StorageError, Table};

pub const OUTPUT_FILE_NAME: &str = "source_code_comments.json";

/// Contents API URL for a repository-relative path. Each path component is
/// percent-encoded, so names containing `#`, `?` or `%` stay in the path.
fn contents_url(
    client: &GitHubClient,
    repo: &RepoUrl,
    path: &str,
) -> Result<String, GitHubError> {
    let base = client.endpoint(&format!("repos/{}/{}/contents", repo.owner, repo.repo));
    let invalid = || GitHubError::InvalidUrl(base.clone());
    let mut url = reqwest::Url::parse(&base).map_err(|_| invalid())?;
    {
        let mut segments = url.path_segments_mut().map_err(|_| invalid())?;
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        if components.peek().is_none() {
            segments.push("");
        }
        segments.extend(components);
    }
    Ok(url.into())
}

/// Depth-first walk of the repository tree returning the non-directory
/// entries accepted by `filter`, in the order a recursive walk would visit
/// them. Directory listings follow `Link` pagination.
///
/// Uses an explicit stack of listing iterators, so deeply nested trees do not
/// grow the call stack.
#[instrument(skip(client, filter), fields(owner = %repo.owner, repo = %repo.repo))]
pub async fn list_source_files(
    client: &GitHubClient,
    repo: &RepoUrl,
    filter: &FileFilter,
) -> Result<Vec<ContentEntry>, GitHubError> {
    let root: Vec<ContentEntry> = client
        .get_all_linked(&contents_url(client, repo, "")?, &[])
        .await?;
    let mut stack = vec![root.into_iter()];
    let mut files = Vec::new();

    while let Some(listing) = stack.last_mut() {
        let Some(entry) = listing.next() else {
            stack.pop();
            continue;
        };

        if entry.kind == EntryKind::Dir {
            debug!(path = %entry.path, depth = stack.len(), "descending into directory");
            let children: Vec<ContentEntry> = client
                .get_all_linked(&contents_url(client, repo, &entry.path)?, &[])
                .await?;
            stack.push(children.into_iter());
        } else if filter.accepts(&entry.name) {
            files.push(entry);
        }
    }

    Ok(files)
}

/// Decode base64 file content as returned by the contents API. Line breaks
/// inside the payload are ignored; invalid UTF-8 is replaced lossily.
pub fn decode_content(path: &str, encoded: &str) -> Result<String, GitHubError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|source| GitHubError::Decode {
            path: path.to_string(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Fetch and decode one file. Returns `None` when the API provides no inline
/// content (empty files, files over the size limit, non-base64 encodings).
#[instrument(skip(client), fields(owner = %repo.owner, repo = %repo.repo))]
pub async fn fetch_file_text(
    client: &GitHubClient,
    repo: &RepoUrl,
    path: &str,
) -> Result<Option<String>, GitHubError> {
    let file: FileContent = client
        .get_json(&contents_url(client, repo, path)?, &[])
        .await?;

    if let Some(encoding) = file.encoding.as_deref() {
        if encoding != "base64" {
            warn!(%path, %encoding, "skipping file with unsupported encoding");
            return Ok(None);
        }
    }

    match file.content.as_deref() {
        Some(content) if !content.trim().is_empty() => decode_content(path, content).map(Some),
        _ => Ok(None),
    }
}

/// Harvests comments from every accepted file of one repository.
pub struct SourceCommentsPipeline {
    repo: RepoUrl,
    filter: FileFilter,
    rules: RuleTable,
}

impl SourceCommentsPipeline {
    pub fn new(repo: RepoUrl, filter: FileFilter, rules: RuleTable) -> Self {
        Self {
            repo,
            filter,
            rules,
        }
    }
}

#[async_trait]
impl Pipeline for SourceCommentsPipeline {
    type Record = CommentRecord;

    fn name(&self) -> &str {
        "source comments"
    }

    fn output_file_name(&self) -> String {
        OUTPUT_FILE_NAME.to_string()
    }

    fn table(&self) -> Table {
        Table::SourceCode
    }

    async fn collect(&self, client: &GitHubClient) -> Result<Vec<CommentRecord>, GitHubError> {
        let files = list_source_files(client, &self.repo, &self.filter).await?;
        info!(
            count = files.len(),
            scope = %self.rules.scope(),
            "listed candidate source files"
        );

        let mut records = Vec::new();
        for file in files {
            let Some(text) = fetch_file_text(client, &self.repo, &file.path).await? else {
                debug!(path = %file.path, "no inline content");
                continue;
            };
            let comments = self.rules.extract(&file.name, &text);
            debug!(path = %file.path, comments = comments.len(), "extracted comments");
            if !comments.is_empty() {
                records.push(CommentRecord {
                    file_name: file.path,
                    comments,
                });
            }
        }
        Ok(records)
    }

    fn store(
        &self,
        db: &mut Database,
        records: &[CommentRecord],
    ) -> Result<InsertSummary, StorageError> {
        db.insert_source_comments(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::RetryPolicy;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo() -> RepoUrl {
        RepoUrl {
            owner: "org".to_string(),
            repo: "repo".to_string(),
        }
    }

    fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new(server.uri(), "token", RetryPolicy::default())
    }

    fn entry(name: &str, path: &str, kind: &str) -> serde_json::Value {
        json!({"name": name, "path": path, "type": kind})
    }

    async fn mount_listing(server: &MockServer, dir: &str, entries: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/org/repo/contents/{dir}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(entries))
            .mount(server)
            .await;
    }

    async fn mount_file(server: &MockServer, file_path: &str, text: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/org/repo/contents/{file_path}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": STANDARD.encode(text),
                "encoding": "base64"
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_decode_content_with_line_breaks() {
        let encoded = STANDARD.encode("// hello world\nint x;\n");
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(
            decode_content("a.cpp", &wrapped).unwrap(),
            "// hello world\nint x;\n"
        );
    }

    #[test]
    fn test_decode_content_rejects_garbage() {
        let err = decode_content("a.cpp", "!!!not base64!!!").unwrap_err();
        assert!(matches!(err, GitHubError::Decode { ref path, .. } if path == "a.cpp"));
    }

    #[tokio::test]
    async fn test_walk_is_depth_first_and_filtered() {
        let server = MockServer::start().await;
        mount_listing(
            &server,
            "",
            json!([
                entry("a", "a", "dir"),
                entry("README", "README", "file"),
                entry("z.py", "z.py", "file")
            ]),
        )
        .await;
        mount_listing(
            &server,
            "a",
            json!([
                entry("b", "a/b", "dir"),
                entry("one.js", "a/one.js", "file"),
                entry("skip.txt", "a/skip.txt", "file")
            ]),
        )
        .await;
        mount_listing(&server, "a/b", json!([entry("deep.go", "a/b/deep.go", "file")])).await;

        let files = list_source_files(&client(&server), &repo(), &FileFilter::source_files())
            .await
            .unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b/deep.go", "a/one.js", "README", "z.py"]);
    }

    #[tokio::test]
    async fn test_walk_follows_link_pagination() {
        let server = MockServer::start().await;
        let next = format!("{}/repos/org/repo/contents/?page=2", server.uri());
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/contents/"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([entry("b.rb", "b.rb", "file")])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/contents/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([entry("a.rb", "a.rb", "file")]))
                    .insert_header("Link", format!("<{next}>; rel=\"next\"").as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let files = list_source_files(&client(&server), &repo(), &FileFilter::source_files())
            .await
            .unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.rb", "b.rb"]);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_walk() {
        let server = MockServer::start().await;
        mount_listing(&server, "", json!([entry("a", "a", "dir")])).await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/contents/a"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result =
            list_source_files(&client(&server), &repo(), &FileFilter::source_files()).await;
        assert!(matches!(result, Err(GitHubError::Status { status: 500, .. })));
    }

    #[test]
    fn test_contents_url_escapes_path_components() {
        let client = GitHubClient::new("http://localhost:1", "t", RetryPolicy::default());
        assert_eq!(
            contents_url(&client, &repo(), "").unwrap(),
            "http://localhost:1/repos/org/repo/contents/"
        );
        assert_eq!(
            contents_url(&client, &repo(), "src/lib.rs").unwrap(),
            "http://localhost:1/repos/org/repo/contents/src/lib.rs"
        );
        assert_eq!(
            contents_url(&client, &repo(), "C#/what?.js").unwrap(),
            "http://localhost:1/repos/org/repo/contents/C%23/what%3F.js"
        );
        assert_eq!(
            contents_url(&client, &repo(), "100%.py").unwrap(),
            "http://localhost:1/repos/org/repo/contents/100%25.py"
        );
    }

    #[tokio::test]
    async fn test_pipeline_harvests_files_with_reserved_characters() {
        let server = MockServer::start().await;
        mount_listing(
            &server,
            "",
            json!([
                entry("C#", "C#", "dir"),
                entry("what?.js", "what?.js", "file")
            ]),
        )
        .await;
        mount_listing(
            &server,
            "C%23",
            json!([entry("Program.cs", "C#/Program.cs", "file")]),
        )
        .await;
        mount_file(&server, "C%23/Program.cs", "// entry point
class Program {}
").await;
        mount_file(&server, "what%3F.js", "/* odd name */
").await;

        let pipeline = SourceCommentsPipeline::new(
            repo(),
            FileFilter::source_files(),
            RuleTable::source_files(),
        );
        let records = pipeline.collect(&client(&server)).await.unwrap();
        assert_eq!(
            records,
            vec![
                CommentRecord {
                    file_name: "C#/Program.cs".to_string(),
                    comments: vec!["// entry point".to_string()],
                },
                CommentRecord {
                    file_name: "what?.js".to_string(),
                    comments: vec!["/* odd name */".to_string()],
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_file_text_without_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/org/repo/contents/big.js"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"content": "", "encoding": "none"})),
            )
            .mount(&server)
            .await;

        let text = fetch_file_text(&client(&server), &repo(), "big.js").await.unwrap();
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn test_pipeline_extracts_whole_file_comments() {
        let server = MockServer::start().await;
        mount_listing(
            &server,
            "",
            json!([
                entry("src", "src", "dir"),
                entry("README", "README", "file"),
                entry("empty.py", "empty.py", "file")
            ]),
        )
        .await;
        mount_listing(&server, "src", json!([entry("Main.java", "src/Main.java", "file")])).await;
        mount_file(
            &server,
            "src/Main.java",
            "/** Entry */\nclass Main { // start\n}\n",
        )
        .await;
        mount_file(&server, "README", "# Title\n<!-- hidden note -->\n").await;
        mount_file(&server, "empty.py", "print('no comments')\n").await;

        let pipeline = SourceCommentsPipeline::new(
            repo(),
            FileFilter::source_files(),
            RuleTable::source_files(),
        );
        let records = pipeline.collect(&client(&server)).await.unwrap();
        assert_eq!(
            records,
            vec![
                CommentRecord {
                    file_name: "src/Main.java".to_string(),
                    comments: vec!["/** Entry */".to_string(), "// start".to_string()],
                },
                CommentRecord {
                    file_name: "README".to_string(),
                    comments: vec!["<!-- hidden note -->".to_string()],
                },
            ]
        );
        assert_eq!(pipeline.output_file_name(), OUTPUT_FILE_NAME);
    }
}
