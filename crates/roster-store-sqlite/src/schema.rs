//! SQL schema for the tracker tables the reconciler reads and writes.
//!
//! The reconciler never runs this against a live database; the web
//! application owns its schema. It is applied to in-memory stores so tests
//! (and anyone trying the tool out) get the same shape. The unique index on
//! `assignments` is the one deployments should carry too: it closes the
//! check-then-insert race between concurrent runs.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    id        INTEGER PRIMARY KEY,
    username  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id     INTEGER PRIMARY KEY,
    title  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS environments (
    id    INTEGER PRIMARY KEY,
    name  TEXT NOT NULL
);

-- Legacy tester columns are loosely typed and carry no foreign keys.
CREATE TABLE IF NOT EXISTS project_pages (
    id             INTEGER PRIMARY KEY,
    project_id     INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    page_name      TEXT,
    at_tester_id   INTEGER,
    ft_tester_id   INTEGER,
    at_tester_ids  TEXT,     -- JSON array, or a comma/space separated list
    ft_tester_ids  TEXT
);

-- page_id is not enforced; rows may outlive their page.
CREATE TABLE IF NOT EXISTS page_environments (
    id              INTEGER PRIMARY KEY,
    page_id         INTEGER NOT NULL,
    environment_id  INTEGER NOT NULL REFERENCES environments(id),
    at_tester_id    INTEGER,
    ft_tester_id    INTEGER
);

-- Project team membership, soft-deleted through is_removed.
CREATE TABLE IF NOT EXISTS user_assignments (
    id          INTEGER PRIMARY KEY,
    project_id  INTEGER NOT NULL REFERENCES projects(id),
    user_id     INTEGER NOT NULL REFERENCES users(id),
    role        TEXT,
    is_removed  INTEGER NOT NULL DEFAULT 0
);

-- The canonical ledger.
CREATE TABLE IF NOT EXISTS assignments (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id        INTEGER REFERENCES projects(id),
    page_id           INTEGER REFERENCES project_pages(id) ON DELETE CASCADE,
    environment_id    INTEGER REFERENCES environments(id),
    task_type         TEXT NOT NULL,   -- 'project_assignment' | 'page_assignment' | 'env_assignment' | ...
    assigned_user_id  INTEGER NOT NULL REFERENCES users(id),
    assigned_role     TEXT NOT NULL,
    meta              TEXT,            -- JSON provenance, or NULL
    created_by        INTEGER REFERENCES users(id),
    created_at        TEXT NOT NULL    -- RFC 3339 UTC
);

-- NULL-safe uniqueness over the dedup key.
CREATE UNIQUE INDEX IF NOT EXISTS assignments_dedup_idx ON assignments (
    IFNULL(project_id, -1),
    IFNULL(page_id, -1),
    IFNULL(environment_id, -1),
    assigned_user_id,
    task_type,
    assigned_role
);

CREATE INDEX IF NOT EXISTS assignments_page_user_idx ON assignments(page_id, assigned_user_id);
CREATE INDEX IF NOT EXISTS project_pages_project_idx ON project_pages(project_id);
CREATE INDEX IF NOT EXISTS page_environments_page_idx ON page_environments(page_id);
";

/// Tables that must exist before the reconciler will touch a database.
pub const REQUIRED_TABLES: [&str; 4] =
  ["project_pages", "page_environments", "user_assignments", "assignments"];
