//! Core table definitions and metadata helpers.
//!
//! Tables:
//! - `role`: access roles grouped by section
//! - `route`: route specs per section, `data` holds the JSON spec
//! - `user_data`: per-user typed key/value items with optional expiry

use super::query::quote_identifier;
use crate::error::DataResult;
use rusqlite::Connection;

/// DDL for the core tables. `{prefix}` is replaced with the table prefix.
pub const CORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS {prefix}role (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    title       TEXT NOT NULL DEFAULT '',
    section     TEXT NOT NULL DEFAULT 'front',
    module      TEXT NOT NULL DEFAULT '',
    active      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS {prefix}route (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    section     TEXT NOT NULL DEFAULT '',
    module      TEXT NOT NULL DEFAULT '',
    priority    INTEGER NOT NULL DEFAULT 0,
    data        TEXT,
    active      INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS {prefix}user_data (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    uid         INTEGER NOT NULL DEFAULT 0,
    module      TEXT NOT NULL DEFAULT '',
    name        TEXT NOT NULL DEFAULT '',
    time        INTEGER NOT NULL DEFAULT 0,
    expire      INTEGER NOT NULL DEFAULT 0,
    value       TEXT,
    value_int   INTEGER,
    value_multi TEXT,
    UNIQUE(uid, module, name)
);

CREATE INDEX IF NOT EXISTS {prefix}idx_role_section ON {prefix}role(section, title);
CREATE INDEX IF NOT EXISTS {prefix}idx_route_section ON {prefix}route(section, active);
CREATE INDEX IF NOT EXISTS {prefix}idx_user_data_expire ON {prefix}user_data(expire);
"#;

pub(crate) fn create_tables(conn: &Connection, prefix: &str) -> DataResult<()> {
    // Validates the prefix as part of an identifier before it lands in DDL.
    quote_identifier(&format!("{}role", prefix))?;
    conn.execute_batch(&CORE_SCHEMA.replace("{prefix}", prefix))?;
    tracing::debug!(prefix, "core schema ready");
    Ok(())
}

pub(crate) fn get_columns(conn: &Connection, table: &str) -> DataResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)?))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}
