//! DDL for the registry tables
//!
//! `hierarchy_edges` and `aliases` cascade with their entity. The audit
//! tables (`collision_log`, `stability_mappings`) and analytics carry no
//! foreign keys so they survive deletions.

pub(crate) const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
";

pub(crate) const MIGRATIONS: &str = "
    -- Registered elements
    CREATE TABLE IF NOT EXISTS entities (
        id                  TEXT PRIMARY KEY,
        prefix              TEXT,
        namespace           TEXT NOT NULL,
        parent_id           TEXT,
        name                TEXT NOT NULL,
        element_type        TEXT NOT NULL,
        attributes_json     TEXT NOT NULL,
        created_at_ms       INTEGER NOT NULL,
        last_accessed_at_ms INTEGER NOT NULL,
        access_count        INTEGER NOT NULL DEFAULT 0,
        lifecycle           TEXT NOT NULL,
        enabled             INTEGER NOT NULL DEFAULT 1,
        priority            INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_entities_namespace ON entities(namespace);
    CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(element_type);
    CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);

    -- Parent/child forest: one parent per child
    CREATE TABLE IF NOT EXISTS hierarchy_edges (
        child_id   TEXT PRIMARY KEY REFERENCES entities(id) ON DELETE CASCADE,
        parent_id  TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        position   INTEGER NOT NULL,
        depth      INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_edges_parent ON hierarchy_edges(parent_id, position);

    -- Human-readable names
    CREATE TABLE IF NOT EXISTS aliases (
        alias          TEXT PRIMARY KEY,
        target_id      TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        is_primary     INTEGER NOT NULL DEFAULT 0,
        created_at_ms  INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_aliases_target ON aliases(target_id);

    -- Per-element usage aggregates
    CREATE TABLE IF NOT EXISTS analytics (
        id                    TEXT PRIMARY KEY,
        total_accesses        INTEGER NOT NULL DEFAULT 0,
        first_access_ms       INTEGER,
        last_access_ms        INTEGER,
        peak_hourly_accesses  INTEGER NOT NULL DEFAULT 0,
        avg_execution_ms      REAL NOT NULL DEFAULT 0,
        execution_count       INTEGER NOT NULL DEFAULT 0,
        success_count         INTEGER NOT NULL DEFAULT 0,
        failure_count         INTEGER NOT NULL DEFAULT 0,
        lifecycle             TEXT NOT NULL DEFAULT 'created',
        lifetime_ms           INTEGER
    );

    CREATE TABLE IF NOT EXISTS access_events (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        id            TEXT NOT NULL,
        timestamp_ms  INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_access_events_id ON access_events(id, timestamp_ms);
    CREATE INDEX IF NOT EXISTS idx_access_events_ts ON access_events(timestamp_ms);

    CREATE TABLE IF NOT EXISTS execution_events (
        seq           INTEGER PRIMARY KEY AUTOINCREMENT,
        id            TEXT NOT NULL,
        action        TEXT NOT NULL,
        duration_ms   REAL NOT NULL,
        success       INTEGER NOT NULL,
        timestamp_ms  INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_execution_events_ts ON execution_events(timestamp_ms);

    -- Append-only collision audit
    CREATE TABLE IF NOT EXISTS collision_log (
        seq             INTEGER PRIMARY KEY AUTOINCREMENT,
        id              TEXT NOT NULL,
        timestamp_ms    INTEGER NOT NULL,
        existing_json   TEXT NOT NULL,
        attempted_json  TEXT NOT NULL,
        strategy        TEXT NOT NULL,
        resolved        INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_collision_log_id ON collision_log(id);

    -- Last seen version per namespace
    CREATE TABLE IF NOT EXISTS version_markers (
        namespace       TEXT PRIMARY KEY,
        version         TEXT NOT NULL,
        recorded_at_ms  INTEGER NOT NULL
    );

    -- Cross-version remaps (new_id NULL = orphaned)
    CREATE TABLE IF NOT EXISTS stability_mappings (
        seq            INTEGER PRIMARY KEY AUTOINCREMENT,
        old_id         TEXT NOT NULL,
        new_id         TEXT,
        confidence     REAL NOT NULL,
        match_source   TEXT NOT NULL,
        namespace      TEXT NOT NULL,
        old_version    TEXT NOT NULL,
        new_version    TEXT NOT NULL,
        created_at_ms  INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_mappings_old ON stability_mappings(old_id, seq DESC);
";

/// Tables reported by `Store::stats`
pub(crate) const TABLES: &[&str] = &[
    "entities",
    "hierarchy_edges",
    "aliases",
    "analytics",
    "access_events",
    "execution_events",
    "collision_log",
    "version_markers",
    "stability_mappings",
];
