//! Database schema and migrations for driveshed.
//!
//! The DDL sticks to types both SQLite and PostgreSQL accept. Timestamps are
//! RFC3339 text.

/// Database migrations, applied in order and tracked in `schema_version`.
pub const MIGRATIONS: &[&str] = &[
    // v1: users, upserted from the identity provider
    r#"
CREATE TABLE users (
    id          TEXT PRIMARY KEY,
    username    TEXT NOT NULL,
    group_names TEXT NOT NULL DEFAULT '',   -- comma-joined
    email       TEXT NOT NULL DEFAULT '',
    home        TEXT NOT NULL DEFAULT '/'
);

CREATE INDEX idx_users_username ON users(username);
"#,
    // v2: file metadata
    r#"
CREATE TABLE files (
    path         TEXT PRIMARY KEY,
    size         BIGINT NOT NULL DEFAULT 0,
    content_type TEXT NOT NULL DEFAULT '',
    description  TEXT NOT NULL DEFAULT '',
    user_id      TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);

CREATE INDEX idx_files_user_id ON files(user_id);
"#,
    // v3: permission records, one per (path, principal)
    r#"
CREATE TABLE permissions (
    path        TEXT NOT NULL,
    allow_mask  BIGINT NOT NULL DEFAULT 0,
    deny_mask   BIGINT NOT NULL DEFAULT 0,
    object_type TEXT NOT NULL,              -- 'user', 'group', 'everyone'
    object_id   TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (path, object_type, object_id)
);
"#,
    // v4: login sessions
    r#"
CREATE TABLE sessions (
    id            TEXT PRIMARY KEY,
    user_id       TEXT NOT NULL,
    access_token  TEXT NOT NULL DEFAULT '',
    refresh_token TEXT NOT NULL DEFAULT '',
    id_token      TEXT NOT NULL DEFAULT '',
    expiry        TEXT NOT NULL
);

CREATE INDEX idx_sessions_expiry ON sessions(expiry);
"#,
    // v5: shares
    r#"
CREATE TABLE shares (
    id          TEXT PRIMARY KEY,
    path        TEXT NOT NULL,
    permissions BIGINT NOT NULL DEFAULT 0,
    user_id     TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX idx_shares_user_id ON shares(user_id);
"#,
];
