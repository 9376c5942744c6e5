//! SQLite connection handle shared by every gateway.

pub mod query;
pub mod schema;
pub mod value;

use crate::error::DataResult;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub use query::{
    Assignment, Column, Combinator, Expr, Join, JoinKind, Op, Order, Predicate, Select, Set, Where,
};

/// SQLite-backed database handle. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open a file-backed database.
    pub fn open(path: &Path) -> DataResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn memory() -> DataResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> DataResult<Self> {
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> DataResult<()> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        // WAL mode for file-backed DBs (reports "memory" for in-memory ones)
        let _ = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0));
        Ok(())
    }

    /// Create the core tables with the given table prefix.
    pub fn init_schema(&self, prefix: &str) -> DataResult<()> {
        self.with_conn(|conn| schema::create_tables(conn, prefix))
    }

    /// Run `f` while holding the connection lock.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> DataResult<T>) -> DataResult<T> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&conn)
    }

    /// Column names of `table` in declaration order, read from table metadata.
    pub fn table_columns(&self, table: &str) -> DataResult<Vec<String>> {
        self.with_conn(|conn| schema::get_columns(conn, table))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
