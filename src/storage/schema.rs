//! Database schema definition

/// Tables are created on open when absent. `source_code.file_name` carries an
/// explicit UNIQUE constraint so the skip-on-conflict insert has a target.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pull_requests (
    pr_number INTEGER PRIMARY KEY,
    owner TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT,
    conversation TEXT NOT NULL,
    files_modified TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS source_code (
    serial_id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_name TEXT NOT NULL UNIQUE,
    comments TEXT NOT NULL
);
"#;
