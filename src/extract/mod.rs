//! Comment extraction driven by a per-extension rule table.
//!
//! Matching is purely textual: no tokenizer, no awareness of string literals.
//! A `//` inside a quoted string is reported as a comment.

pub mod filter;
pub mod patch;

pub use filter::FileFilter;

use lazy_regex::{lazy_regex, Lazy, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static SINGLE_LINE: Lazy<Regex> = lazy_regex!(r"//.*|#.*");
static SLASH_LINE: Lazy<Regex> = lazy_regex!(r"//.*");
static HASH_LINE: Lazy<Regex> = lazy_regex!(r"#.*");
static MULTI_LINE: Lazy<Regex> = lazy_regex!(r"(?s)/\*.*?\*/");
static HTML: Lazy<Regex> = lazy_regex!(r"(?s)<!--.*?-->");
static C_STYLE: Lazy<Regex> = lazy_regex!(r"(?ms)//.*?$|/\*.*?\*/");

pub const README_FILE_NAME: &str = "README.md";
pub const BARE_README_FILE_NAME: &str = "README";

/// One comment shape a rule can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// `//` or `#` through end of line
    SingleLine,
    /// `//` through end of line
    SlashLine,
    /// `#` through end of line
    HashLine,
    /// `/* ... */`, may span lines
    MultiLine,
    /// `<!-- ... -->`, may span lines
    Html,
    /// `//` line comments and `/* */` blocks in a single pass, in textual order
    CStyle,
}

impl PatternKind {
    fn regex(self) -> &'static Regex {
        match self {
            PatternKind::SingleLine => &SINGLE_LINE,
            PatternKind::SlashLine => &SLASH_LINE,
            PatternKind::HashLine => &HASH_LINE,
            PatternKind::MultiLine => &MULTI_LINE,
            PatternKind::Html => &HTML,
            PatternKind::CStyle => &C_STYLE,
        }
    }
}

/// What text a rule table is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Unified-diff patch of one file; only lines present in the new version are scanned.
    Patch,
    /// The complete decoded file content.
    WholeFile,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Patch => write!(f, "patch"),
            Scope::WholeFile => write!(f, "whole-file"),
        }
    }
}

/// Immutable mapping from extension tag (e.g. `.java`) to the ordered
/// pattern kinds applied to files of that type.
#[derive(Debug, Clone)]
pub struct RuleTable {
    scope: Scope,
    readme_names: Vec<String>,
    readme_rules: Vec<PatternKind>,
    rules: BTreeMap<String, Vec<PatternKind>>,
}

impl RuleTable {
    fn build(
        scope: Scope,
        readme_names: &[&str],
        groups: &[(&[&str], &[PatternKind])],
    ) -> Self {
        let mut rules = BTreeMap::new();
        for (tags, kinds) in groups {
            for tag in *tags {
                rules.insert(tag.to_string(), kinds.to_vec());
            }
        }
        Self {
            scope,
            readme_names: readme_names.iter().map(|n| n.to_string()).collect(),
            readme_rules: vec![PatternKind::Html],
            rules,
        }
    }

    /// Rules for the pull-request pipeline, applied to diff patches.
    pub fn pull_requests() -> Self {
        use PatternKind::*;
        Self::build(
            Scope::Patch,
            &[README_FILE_NAME],
            &[
                (
                    &[".java", ".cpp", ".js", ".scala", ".cs", ".hpp"],
                    &[SingleLine, MultiLine],
                ),
                (&[".sh", ".py", ".rb", ".go", ".clj"], &[SingleLine]),
                (&[".php"], &[MultiLine, Html]),
                (&[".html"], &[Html]),
                (&[".json"], &[SlashLine, MultiLine]),
            ],
        )
    }

    /// Rules for the source-comments pipeline, applied to whole files.
    pub fn source_files() -> Self {
        use PatternKind::*;
        Self::build(
            Scope::WholeFile,
            &[README_FILE_NAME, BARE_README_FILE_NAME],
            &[
                (
                    &[
                        ".java", ".cpp", ".js", ".go", ".cs", ".rb", ".scala", ".sh", ".clj",
                        ".hpp", ".json",
                    ],
                    &[CStyle],
                ),
                (&[".html", ".php"], &[Html]),
                (&[".py"], &[HashLine]),
            ],
        )
    }

    /// Replace (or add) the rules for the given extension tags.
    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Vec<PatternKind>>) -> Self {
        for (tag, kinds) in overrides {
            self.rules.insert(tag.clone(), kinds.clone());
        }
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn rules_for_tag(&self, tag: &str) -> &[PatternKind] {
        self.rules.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    /// README names take precedence over the extension tag.
    pub fn rules_for(&self, file_name: &str) -> &[PatternKind] {
        if self.readme_names.iter().any(|n| n == file_name) {
            return &self.readme_rules;
        }
        self.rules_for_tag(&extension_tag(file_name))
    }

    /// Extract comments from `text` belonging to `file_name`, honouring the
    /// table's scope.
    pub fn extract(&self, file_name: &str, text: &str) -> Vec<String> {
        let rules = self.rules_for(file_name);
        match self.scope {
            Scope::Patch => extract_comments(&patch::visible_text(text), rules),
            Scope::WholeFile => extract_comments(text, rules),
        }
    }
}

/// `.` followed by whatever comes after the last dot; the whole name when
/// there is no dot.
pub fn extension_tag(file_name: &str) -> String {
    let suffix = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or(file_name);
    format!(".{suffix}")
}

/// Apply each pattern kind in order and concatenate the matches. Every match
/// is trimmed and empty results are dropped.
pub fn extract_comments(text: &str, rules: &[PatternKind]) -> Vec<String> {
    rules
        .iter()
        .flat_map(|kind| kind.regex().find_iter(text))
        .map(|m| m.as_str().trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
