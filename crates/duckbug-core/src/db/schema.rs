//! Canonical SQLite schema for the duckbug event store.
//!
//! Two parallel pipelines share one shape:
//! - `error_groups` / `log_groups` hold one aggregate row per fingerprint
//! - `errors` / `logs` hold every ingested occurrence
//! - `store_meta` records the applied schema version
//!
//! Events reference their group by `fingerprint` without a foreign key so
//! explicit group deletion never cascades into event history.

/// Migration v1: group and event tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS error_groups (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL CHECK (length(trim(project_id)) > 0),
    file TEXT NOT NULL,
    line INTEGER NOT NULL DEFAULT 0 CHECK (line >= 0),
    message TEXT NOT NULL,
    first_seen_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL,
    counter INTEGER NOT NULL DEFAULT 1 CHECK (counter >= 1),
    status TEXT NOT NULL DEFAULT 'unresolved'
        CHECK (status IN ('unresolved', 'resolved', 'ignored'))
);

CREATE TABLE IF NOT EXISTS log_groups (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL CHECK (length(trim(project_id)) > 0),
    level TEXT NOT NULL CHECK (level IN ('DEBUG', 'INFO', 'WARN', 'ERROR')),
    message TEXT NOT NULL,
    first_seen_at INTEGER NOT NULL,
    last_seen_at INTEGER NOT NULL,
    counter INTEGER NOT NULL DEFAULT 1 CHECK (counter >= 1),
    status TEXT NOT NULL DEFAULT 'unresolved'
        CHECK (status IN ('unresolved', 'resolved', 'ignored'))
);

CREATE TABLE IF NOT EXISTS errors (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    message TEXT NOT NULL,
    stacktrace TEXT,
    file TEXT NOT NULL,
    line INTEGER NOT NULL DEFAULT 0,
    context TEXT,
    ip TEXT,
    url TEXT,
    method TEXT,
    headers TEXT,
    query_params TEXT,
    body_params TEXT,
    cookies TEXT,
    session TEXT,
    files TEXT,
    env TEXT,
    time INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS logs (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    level TEXT NOT NULL CHECK (level IN ('DEBUG', 'INFO', 'WARN', 'ERROR')),
    message TEXT NOT NULL,
    context TEXT,
    time INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

INSERT OR IGNORE INTO store_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes for stats windows and group listings.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_errors_project_time
    ON errors(project_id, time);

CREATE INDEX IF NOT EXISTS idx_errors_project_fingerprint_time
    ON errors(project_id, fingerprint, time);

CREATE INDEX IF NOT EXISTS idx_logs_project_time
    ON logs(project_id, time);

CREATE INDEX IF NOT EXISTS idx_logs_project_fingerprint_time
    ON logs(project_id, fingerprint, time);

CREATE INDEX IF NOT EXISTS idx_error_groups_project_last_seen
    ON error_groups(project_id, last_seen_at DESC);

CREATE INDEX IF NOT EXISTS idx_error_groups_project_status
    ON error_groups(project_id, status);

CREATE INDEX IF NOT EXISTS idx_log_groups_project_last_seen
    ON log_groups(project_id, last_seen_at DESC);

CREATE INDEX IF NOT EXISTS idx_log_groups_project_status
    ON log_groups(project_id, status);
";

/// Indexes expected by the stats and listing query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_errors_project_time",
    "idx_errors_project_fingerprint_time",
    "idx_logs_project_time",
    "idx_logs_project_fingerprint_time",
    "idx_error_groups_project_last_seen",
    "idx_error_groups_project_status",
    "idx_log_groups_project_last_seen",
    "idx_log_groups_project_status",
];
