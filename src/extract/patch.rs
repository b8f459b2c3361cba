//! Reduction of a single-file unified-diff patch to the text that exists in
//! the new version of the file.

use tracing::trace;

/// A contiguous region of changes within a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// Header line (`@@ -a,b +c,d @@ ...`), absent for a headerless patch
    pub header: Option<String>,
    /// Raw lines of the hunk (prefixed with +, -, or space)
    pub lines: Vec<String>,
}

impl Hunk {
    /// Added and context lines with their one-character prefix removed.
    pub fn visible_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(|line| {
            line.strip_prefix('+')
                .or_else(|| line.strip_prefix(' '))
                .or_else(|| line.is_empty().then_some(""))
        })
    }
}

/// Split a patch as returned by the pull-request files API into hunks.
///
/// The patch carries no `diff --git` header; it starts at the first
/// `@@ -a,b +c,d @@` line. Lines before any hunk header form a headerless
/// hunk. `\ No newline at end of file` markers are dropped.
pub fn parse_patch(patch: &str) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in patch.lines() {
        if line.starts_with("@@") {
            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
            current = Some(Hunk {
                header: Some(line.to_string()),
                lines: Vec::new(),
            });
            continue;
        }

        if line.starts_with('\\') {
            continue;
        }

        current
            .get_or_insert_with(|| Hunk {
                header: None,
                lines: Vec::new(),
            })
            .lines
            .push(line.to_string());
    }

    if let Some(hunk) = current {
        hunks.push(hunk);
    }
    hunks
}

/// Text of the new version covered by the patch, hunks joined by newlines.
pub fn visible_text(patch: &str) -> String {
    let hunks = parse_patch(patch);
    for hunk in &hunks {
        trace!(
            header = hunk.header.as_deref().unwrap_or("<none>"),
            lines = hunk.lines.len(),
            "scanning hunk"
        );
    }
    let mut text = String::with_capacity(patch.len());
    for line in hunks.iter().flat_map(Hunk::visible_lines) {
        text.push_str(line);
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_PATCH: &str = "@@ -1,5 +1,7 @@
 fn main() {
-    println!(\"old\");
+    println!(\"new\");
+    // Added a comment
 }
@@ -20,2 +22,3 @@ impl Foo {
 let a = 1;
+/* block
+   continues */
\\ No newline at end of file";

    #[test]
    fn test_parse_hunks() {
        let hunks = parse_patch(SAMPLE_PATCH);
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].header.as_deref(), Some("@@ -1,5 +1,7 @@"));
        assert_eq!(hunks[0].lines.len(), 5);
        assert_eq!(hunks[1].header.as_deref(), Some("@@ -20,2 +22,3 @@ impl Foo {"));
        assert_eq!(hunks[1].lines.len(), 3);
    }

    #[test]
    fn test_visible_text_drops_removed_lines() {
        let text = visible_text(SAMPLE_PATCH);
        assert!(!text.contains("old"));
        assert!(!text.contains("@@"));
        assert!(!text.contains("No newline"));
        assert_eq!(
            text,
            "fn main() {\n    println!(\"new\");\n    // Added a comment\n}\nlet a = 1;\n/* block\n   continues */\n"
        );
    }

    #[test]
    fn test_block_comment_across_added_lines_is_unprefixed() {
        let text = visible_text("@@ -0,0 +1,2 @@\n+/* a\n+ b */\n");
        assert_eq!(text, "/* a\n b */\n");
    }

    #[test]
    fn test_headerless_patch() {
        let hunks = parse_patch("+added\n context");
        assert_eq!(hunks.len(), 1);
        assert!(hunks[0].header.is_none());
        assert_eq!(visible_text("+added\n context"), "added\ncontext\n");
    }

    #[test]
    fn test_empty_patch() {
        assert!(parse_patch("").is_empty());
        assert_eq!(visible_text(""), "");
    }
}
