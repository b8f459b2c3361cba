use std::collections::BTreeSet;

use super::{extension_tag, BARE_README_FILE_NAME, README_FILE_NAME};

/// Extensions whose files are inspected for comments.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".java", ".cpp", ".html", ".js", ".scala", ".sh", ".clj", ".cs", ".go", ".php", ".hpp", ".py",
    ".json", ".rb",
];

/// Decides whether a file is worth fetching and scanning, from its name alone.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: BTreeSet<String>,
    readme_names: Vec<String>,
}

impl FileFilter {
    pub fn new<I, S>(extensions: I, readme_names: &[&str]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions.into_iter().map(Into::into).collect(),
            readme_names: readme_names.iter().map(|n| n.to_string()).collect(),
        }
    }

    /// The pull-request pipeline only recognises `README.md`.
    pub fn pull_requests() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().copied(), &[README_FILE_NAME])
    }

    /// The source-comments pipeline also recognises a bare `README`.
    pub fn source_files() -> Self {
        Self::new(
            DEFAULT_EXTENSIONS.iter().copied(),
            &[README_FILE_NAME, BARE_README_FILE_NAME],
        )
    }

    pub fn with_extensions(mut self, extensions: &[String]) -> Self {
        self.extensions = extensions.iter().cloned().collect();
        self
    }

    pub fn accepts(&self, file_name: &str) -> bool {
        self.readme_names.iter().any(|n| n == file_name)
            || self.extensions.contains(&extension_tag(file_name))
    }
}
