//! Per-table data access.
//!
//! A [`TableGateway`] owns query construction and row materialization for one
//! table:
//! - `find` / `select` / `select_with` read rows, decoding JSON columns
//! - `update` / `increment` / `delete` write and notify observers
//! - `count` returns `None` instead of an error when the query fails
//! - `create_row` / `save` / `delete_row` drive single-row lifecycles

mod row;

pub use row::Row;

use crate::db::query::{quote_identifier, quote_value};
use crate::db::value::{from_sql, to_sql};
use crate::db::{Database, Expr, Join, Order, Select, Set, Where};
use crate::error::{DataError, DataResult};
use crate::observer::ObserverHub;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Keys per DELETE statement; SQLite caps bound variables per statement.
const DELETE_BATCH: usize = 500;

/// Static description of a table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDef {
    pub name: String,
    pub primary_key: Option<String>,
    /// Declared columns; empty means "ask the database".
    pub columns: Vec<String>,
    /// Columns holding JSON-encoded structured values.
    pub encode_columns: BTreeSet<String>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn encode<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.encode_columns = columns.into_iter().map(Into::into).collect();
        self
    }
}

/// Key argument of [`TableGateway::find`].
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    One(Value),
    Many(Vec<Value>),
}

impl Key {
    pub fn one(value: impl Into<Value>) -> Self {
        Self::One(value.into())
    }

    pub fn many<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::Many(values.into_iter().map(Into::into).collect())
    }
}

/// Result of [`TableGateway::find`], shaped like the key.
#[derive(Debug, Clone, PartialEq)]
pub enum Found {
    One(Option<Row>),
    Many(Vec<Row>),
}

impl Found {
    pub fn into_one(self) -> Option<Row> {
        match self {
            Found::One(row) => row,
            Found::Many(rows) => rows.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<Row> {
        match self {
            Found::One(row) => row.into_iter().collect(),
            Found::Many(rows) => rows,
        }
    }
}

/// Grouping options for [`TableGateway::count_with`].
#[derive(Debug, Clone, Default)]
pub struct CountOptions {
    pub group: Vec<String>,
    pub having: Option<Where>,
    /// Top-N groups by count.
    pub limit: Option<u64>,
}

impl CountOptions {
    pub fn group_by<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            group: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Count {
    Total(i64),
    /// One row per group, each with a `count` column plus the group columns.
    Grouped(Vec<Row>),
}

impl Count {
    pub fn total(&self) -> Option<i64> {
        match self {
            Count::Total(n) => Some(*n),
            Count::Grouped(_) => None,
        }
    }
}

/// Gateway for one table. Clones share the database and observer hub.
#[derive(Debug, Clone)]
pub struct TableGateway {
    db: Database,
    table: String,
    def: TableDef,
    observers: Arc<ObserverHub>,
}

impl TableGateway {
    /// Gateway for `prefix + def.name`.
    pub fn new(
        db: Database,
        def: TableDef,
        prefix: &str,
        observers: Arc<ObserverHub>,
    ) -> DataResult<Self> {
        let table = format!("{}{}", prefix, def.name);
        quote_identifier(&table)?;
        if let Some(pk) = &def.primary_key {
            quote_identifier(pk)?;
        }
        for column in def.columns.iter().chain(def.encode_columns.iter()) {
            quote_identifier(column)?;
        }
        Ok(Self {
            db,
            table,
            def,
            observers,
        })
    }

    /// Effective (prefixed) table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn def(&self) -> &TableDef {
        &self.def
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.def.primary_key.as_deref()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Declared columns, or the table's metadata columns when none are
    /// declared and `fetch` is set.
    pub fn columns(&self, fetch: bool) -> DataResult<Vec<String>> {
        if self.def.columns.is_empty() && fetch {
            self.db.table_columns(&self.table)
        } else {
            Ok(self.def.columns.clone())
        }
    }

    pub fn quote_identifier(&self, identifier: &str) -> DataResult<String> {
        quote_identifier(identifier)
    }

    pub fn quote_value(&self, value: &Value) -> String {
        quote_value(value)
    }

    /// New unsaved row bound to this gateway.
    pub fn create_row<K: Into<String>>(&self, data: impl IntoIterator<Item = (K, Value)>) -> Row {
        let data = data.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Row::detached(&self.table, self.def.primary_key.clone(), data)
    }

    /// Fetch rows by primary key, or by `column` when given.
    ///
    /// A single key yields `Found::One`, a key list yields `Found::Many`.
    pub fn find(&self, key: Key, column: Option<&str>) -> DataResult<Found> {
        let column = column
            .or(self.def.primary_key.as_deref())
            .ok_or_else(|| DataError::config(format!("no key column for table {}", self.table)))?;
        match key {
            Key::One(value) => {
                let select = Select::new().filter(Where::new().eq(column, value)).limit(1);
                Ok(Found::One(self.select_with(&select)?.into_iter().next()))
            }
            Key::Many(mut values) => {
                let filter = if values.len() == 1 {
                    Where::new().eq(column, values.remove(0))
                } else {
                    Where::new().is_in(column, values)
                };
                Ok(Found::Many(self.select(filter)?))
            }
        }
    }

    /// Fetch one row by primary key.
    pub fn find_one(&self, key: impl Into<Value>) -> DataResult<Option<Row>> {
        Ok(self.find(Key::one(key), None)?.into_one())
    }

    pub fn select(&self, filter: Where) -> DataResult<Vec<Row>> {
        self.select_with(&Select::new().filter(filter))
    }

    /// First row matching `filter`.
    pub fn select_one(&self, filter: Where) -> DataResult<Option<Row>> {
        let rows = self.select_with(&Select::new().filter(filter).limit(1))?;
        Ok(rows.into_iter().next())
    }

    pub fn select_with(&self, select: &Select) -> DataResult<Vec<Row>> {
        let mut params = Vec::new();
        let sql = select.to_sql(&self.table, &mut params)?;
        self.query_rows(&sql, &params)
    }

    /// Insert a new record and return its rowid.
    pub fn insert(&self, values: &BTreeMap<String, Value>) -> DataResult<i64> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(&self.table)?)
        } else {
            let columns = values
                .keys()
                .map(|c| quote_identifier(c))
                .collect::<DataResult<Vec<_>>>()?;
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_identifier(&self.table)?,
                columns.join(", "),
                vec!["?"; values.len()].join(", ")
            )
        };
        let params: Vec<SqlValue> = values
            .iter()
            .map(|(column, value)| to_sql(&self.encode_value(column, value)))
            .collect();
        tracing::debug!(table = %self.table, "insert");
        self.db.with_conn(|conn| {
            conn.execute(&sql, params_from_iter(params.iter()))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Update matching rows; `None` updates the whole table.
    pub fn update(&self, set: &Set, filter: Option<&Where>) -> DataResult<usize> {
        self.update_with_joins(set, filter, &[])
    }

    /// Update rows matching `filter` evaluated over the table joined with `joins`.
    pub fn update_with_joins(
        &self,
        set: &Set,
        filter: Option<&Where>,
        joins: &[Join],
    ) -> DataResult<usize> {
        let table = quote_identifier(&self.table)?;
        let mut params = Vec::new();
        let encoded = set.map_values(|column, value| self.encode_value(column, value));
        let mut sql = format!("UPDATE {} SET {}", table, encoded.compile(&mut params)?);
        // Joined tables may share column names; bare names refer to this table.
        let qualifier = (!joins.is_empty()).then_some(self.table.as_str());
        let condition = match filter {
            Some(filter) => filter.compile_qualified(&mut params, qualifier)?,
            None => None,
        };
        if joins.is_empty() {
            if let Some(condition) = condition {
                sql.push_str(" WHERE ");
                sql.push_str(&condition);
            }
        } else {
            let joins = joins
                .iter()
                .map(Join::to_sql)
                .collect::<DataResult<Vec<_>>>()?;
            sql.push_str(&format!(
                " WHERE rowid IN (SELECT {}.rowid FROM {} {}",
                table,
                table,
                joins.join(" ")
            ));
            if let Some(condition) = condition {
                sql.push_str(" WHERE ");
                sql.push_str(&condition);
            }
            sql.push(')');
        }

        tracing::debug!(table = %self.table, sql = %sql, "update");
        let affected = self
            .db
            .with_conn(|conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))?;
        self.observers.notify_updated(&self.table, set, filter);
        Ok(affected)
    }

    /// Add `delta` to each named column of the matching rows in one statement.
    pub fn increment(&self, columns: &[&str], filter: Option<&Where>, delta: i64) -> DataResult<usize> {
        let operator = if delta > 0 { '+' } else { '-' };
        let set = columns.iter().try_fold(Set::new(), |set, column| {
            let quoted = quote_identifier(column)?;
            Ok::<_, DataError>(set.expr(
                *column,
                Expr::new(format!("{} {} {}", quoted, operator, delta.unsigned_abs())),
            ))
        })?;
        self.update(&set, filter)
    }

    /// Delete matching rows, notifying observers once per row first.
    pub fn delete(&self, filter: &Where) -> DataResult<usize> {
        let rows = self.select(filter.clone())?;
        if rows.is_empty() {
            return Ok(0);
        }
        for row in &rows {
            self.observers.notify_deleted(&self.table, row);
        }

        // Restrict to the rows just announced when they can be addressed by
        // key, in batches that stay under SQLite's bound-variable limit.
        let filters = match self.primary_key() {
            Some(pk) => {
                let ids: Vec<Value> = rows.iter().filter_map(|r| r.id().cloned()).collect();
                ids.chunks(DELETE_BATCH)
                    .map(|chunk| filter.clone().is_in(pk, chunk.iter().cloned()))
                    .collect()
            }
            None => vec![filter.clone()],
        };
        self.delete_where(&filters)
    }

    /// Run one DELETE per filter inside a single transaction.
    fn delete_where(&self, filters: &[Where]) -> DataResult<usize> {
        let table = quote_identifier(&self.table)?;
        let statements = filters
            .iter()
            .map(|filter| {
                let mut params = Vec::new();
                let mut sql = format!("DELETE FROM {}", table);
                if let Some(condition) = filter.compile(&mut params)? {
                    sql.push_str(" WHERE ");
                    sql.push_str(&condition);
                }
                Ok((sql, params))
            })
            .collect::<DataResult<Vec<_>>>()?;
        tracing::debug!(table = %self.table, statements = statements.len(), "delete");
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut removed = 0;
            for (sql, params) in &statements {
                removed += tx.execute(sql, params_from_iter(params.iter()))?;
            }
            tx.commit()?;
            Ok(removed)
        })
    }

    /// Number of matching rows, or `None` when the query fails.
    pub fn count(&self, filter: &Where) -> Option<Count> {
        self.count_with(filter, &CountOptions::default())
    }

    /// Count, grouped when `options.group` is set.
    pub fn count_with(&self, filter: &Where, options: &CountOptions) -> Option<Count> {
        let mut select = Select::new()
            .column_expr(Expr::count_all(), "count")
            .filter(filter.clone());
        if !options.group.is_empty() {
            select = select.columns(options.group.iter().cloned());
            for column in &options.group {
                select = select.group_by(column.clone());
            }
            if let Some(limit) = options.limit {
                select = select.limit(limit).order_by("count", Order::Desc);
            }
        }
        if let Some(having) = &options.having {
            select = select.having(having.clone());
        }

        match self.select_with(&select) {
            Ok(rows) if !options.group.is_empty() => Some(Count::Grouped(rows)),
            Ok(rows) => Some(Count::Total(
                rows.first().and_then(|r| r.get_i64("count")).unwrap_or(0),
            )),
            Err(e) => {
                tracing::warn!(table = %self.table, error = %e, "count failed");
                None
            }
        }
    }

    /// Insert a new row or write the dirty columns of a persisted one.
    pub fn save(&self, row: &mut Row) -> DataResult<()> {
        self.ensure_owned(row)?;
        if !row.is_persisted() {
            let values: BTreeMap<String, Value> = row
                .to_map()
                .iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let rowid = self.insert(&values)?;
            if let Some(pk) = self.def.primary_key.clone() {
                if row.id().is_none() {
                    row.set(&pk, rowid)?;
                }
            }
            row.mark_clean();
            return Ok(());
        }

        let dirty = row.dirty_columns();
        if dirty.is_empty() {
            return Ok(());
        }
        let (pk, id) = match (self.primary_key(), row.id()) {
            (Some(pk), Some(id)) => (pk, id.clone()),
            _ => {
                return Err(DataError::config(format!(
                    "cannot update a {} row without primary key",
                    self.table
                )))
            }
        };
        let set = dirty
            .into_iter()
            .fold(Set::new(), |set, column| set.value(column, row[column].clone()));
        self.update(&set, Some(&Where::new().eq(pk, id)))?;
        row.mark_clean();
        Ok(())
    }

    /// Delete one persisted row by primary key.
    pub fn delete_row(&self, row: &Row) -> DataResult<usize> {
        self.ensure_owned(row)?;
        let (pk, id) = match (self.primary_key(), row.id()) {
            (Some(pk), Some(id)) if row.is_persisted() => (pk, id.clone()),
            _ => {
                return Err(DataError::config(format!(
                    "cannot delete an unsaved {} row",
                    self.table
                )))
            }
        };
        self.observers.notify_deleted(&self.table, row);
        self.delete_where(&[Where::new().eq(pk, id)])
    }

    // Encoded columns always hold JSON text, strings included, so reads can
    // parse them back to the written value.
    fn encode_value(&self, column: &str, value: &Value) -> Value {
        if value.is_null() || !self.def.encode_columns.contains(column) {
            value.clone()
        } else {
            Value::String(value.to_string())
        }
    }

    fn ensure_owned(&self, row: &Row) -> DataResult<()> {
        if row.table() != self.table {
            return Err(DataError::config(format!(
                "row of table {} cannot be written through gateway of {}",
                row.table(),
                self.table
            )));
        }
        Ok(())
    }

    fn query_rows(&self, sql: &str, params: &[SqlValue]) -> DataResult<Vec<Row>> {
        tracing::debug!(table = %self.table, sql, "select");
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let mut out = Vec::new();
            while let Some(r) = rows.next()? {
                let mut data = BTreeMap::new();
                for (i, name) in names.iter().enumerate() {
                    let decode = self.def.encode_columns.contains(name);
                    data.insert(name.clone(), from_sql(r.get_ref(i)?, decode));
                }
                out.push(Row::loaded(&self.table, self.def.primary_key.clone(), data));
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roles() -> TableGateway {
        let db = Database::memory().unwrap();
        db.init_schema("").unwrap();
        let def = TableDef::new("role").primary_key("id");
        let gw = TableGateway::new(db, def, "", Arc::new(ObserverHub::new())).unwrap();
        for (name, section) in [("admin", "admin"), ("member", "front"), ("guest", "front")] {
            let mut row = gw.create_row([
                ("name", json!(name)),
                ("title", json!(name.to_uppercase())),
                ("section", json!(section)),
            ]);
            gw.save(&mut row).unwrap();
        }
        gw
    }

    #[test]
    fn find_by_scalar_key_returns_single_row() {
        let gw = roles();
        let row = gw.find(Key::one(1), None).unwrap().into_one().unwrap();
        assert_eq!(row["name"], json!("admin"));

        let missing = gw.find(Key::one(99), None).unwrap();
        assert_eq!(missing, Found::One(None));
    }

    #[test]
    fn find_by_key_list_returns_rows() {
        let gw = roles();
        let found = gw
            .find(Key::many(["member", "guest"]), Some("name"))
            .unwrap();
        assert!(matches!(&found, Found::Many(rows) if rows.len() == 2));

        let single = gw.find(Key::many([3]), None).unwrap().into_many();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0]["name"], json!("guest"));
    }

    #[test]
    fn find_without_key_column_is_a_config_error() {
        let db = Database::memory().unwrap();
        db.init_schema("").unwrap();
        let gw = TableGateway::new(db, TableDef::new("role"), "", Arc::new(ObserverHub::new()))
            .unwrap();
        let err = gw.find(Key::one(1), None).unwrap_err();
        assert!(matches!(err, DataError::Config { .. }));
    }

    #[test]
    fn count_total_and_grouped() {
        let gw = roles();
        assert_eq!(gw.count(&Where::new()), Some(Count::Total(3)));
        assert_eq!(
            gw.count(&Where::new().eq("section", "front")).and_then(|c| c.total()),
            Some(2)
        );

        let grouped = gw
            .count_with(
                &Where::new(),
                &CountOptions {
                    limit: Some(1),
                    ..CountOptions::group_by(["section"])
                },
            )
            .unwrap();
        match grouped {
            Count::Grouped(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0]["section"], json!("front"));
                assert_eq!(rows[0]["count"], json!(2));
            }
            other => panic!("expected grouped count, got {:?}", other),
        }
    }

    #[test]
    fn count_on_broken_query_returns_none() {
        let gw = roles();
        assert_eq!(gw.count(&Where::new().eq("no_such_column", 1)), None);
    }

    #[test]
    fn increment_and_decrement_columns() {
        let gw = roles();
        let filter = Where::new().eq("name", "admin");
        assert_eq!(gw.increment(&["active"], Some(&filter), 4).unwrap(), 1);
        assert_eq!(gw.find_one(1).unwrap().unwrap()["active"], json!(5));
        gw.increment(&["active"], Some(&filter), -2).unwrap();
        assert_eq!(gw.find_one(1).unwrap().unwrap()["active"], json!(3));
        assert!(gw.increment(&["active; --"], None, 1).is_err());
    }

    #[test]
    fn save_updates_only_dirty_columns_of_loaded_row() {
        let gw = roles();
        let mut row = gw.find_one(2).unwrap().unwrap();
        row.set("title", "Member").unwrap();
        row.save(&gw).unwrap();
        assert!(!row.is_dirty());
        assert_eq!(gw.find_one(2).unwrap().unwrap()["title"], json!("Member"));
    }

    #[test]
    fn row_cannot_be_saved_through_another_gateway() {
        let gw = roles();
        let routes = TableGateway::new(
            gw.database().clone(),
            TableDef::new("route").primary_key("id"),
            "",
            Arc::new(ObserverHub::new()),
        )
        .unwrap();
        let mut row = gw.find_one(1).unwrap().unwrap();
        row.set("title", "x").unwrap();
        assert!(matches!(routes.save(&mut row), Err(DataError::Config { .. })));
    }

    #[test]
    fn columns_fall_back_to_metadata() {
        let gw = roles();
        assert!(gw.columns(false).unwrap().is_empty());
        let cols = gw.columns(true).unwrap();
        assert_eq!(cols.first().map(String::as_str), Some("id"));
        assert!(cols.contains(&"section".to_string()));
    }

    #[test]
    fn update_with_join_narrows_by_joined_table() {
        let gw = roles();
        gw.database()
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO route (name, section, module) VALUES ('home', 'front', 'system')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let affected = gw
            .update_with_joins(
                &Set::new().value("active", 0),
                Some(&Where::new().eq("route.name", "home")),
                &[Join::inner("route", "\"route\".\"section\" = \"role\".\"section\"")],
            )
            .unwrap();
        assert_eq!(affected, 2);
        assert_eq!(gw.count(&Where::new().eq("active", 0)), Some(Count::Total(2)));
    }

    #[test]
    fn update_with_join_resolves_shared_columns_to_own_table() {
        let gw = roles();
        gw.database()
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO route (name, section) VALUES ('dashboard', 'admin')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        let join = Join::inner("route", "\"route\".\"section\" = \"role\".\"section\"");
        let affected = gw
            .update_with_joins(
                &Set::new().value("active", 0),
                Some(&Where::new().eq("id", 1).eq("active", 1)),
                &[join],
            )
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(gw.find_one(1).unwrap().unwrap()["active"], json!(0));
        assert_eq!(gw.count(&Where::new().eq("active", 0)), Some(Count::Total(1)));
    }

    #[test]
    fn delete_spanning_several_batches_removes_every_row() {
        let gw = roles();
        gw.database()
            .with_conn(|conn| {
                let mut stmt = conn.prepare("INSERT INTO role (name, section) VALUES (?1, 'bulk')")?;
                for i in 0..(DELETE_BATCH * 2 + 7) {
                    stmt.execute([format!("bulk-{}", i)])?;
                }
                Ok(())
            })
            .unwrap();
        let removed = gw.delete(&Where::new().eq("section", "bulk")).unwrap();
        assert_eq!(removed, DELETE_BATCH * 2 + 7);
        assert_eq!(gw.count(&Where::new()), Some(Count::Total(3)));
    }
}
