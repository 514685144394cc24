pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS saved_session (
    id INTEGER PRIMARY KEY,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS saved_session_apps (
    session_id INTEGER NOT NULL REFERENCES saved_session(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    bundle_identifier TEXT,
    bundle_path TEXT NOT NULL,
    display_name TEXT NOT NULL,
    is_frontmost INTEGER DEFAULT 0,
    PRIMARY KEY (session_id, position)
);
"#;
