use super::TableGateway;
use crate::error::{DataError, DataResult};
use serde_json::Value;
use std::collections::BTreeMap;

static NULL: Value = Value::Null;

/// One record of a table with dirty tracking.
///
/// A row remembers the table it was created for and can only be saved or
/// deleted through that table's gateway. Once the primary key holds a value
/// it can no longer be changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: String,
    primary_key: Option<String>,
    data: BTreeMap<String, Value>,
    // Last persisted state; `None` until the row exists in the database.
    clean: Option<BTreeMap<String, Value>>,
}

impl Row {
    pub(crate) fn detached(
        table: &str,
        primary_key: Option<String>,
        data: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            table: table.to_string(),
            primary_key,
            data,
            clean: None,
        }
    }

    pub(crate) fn loaded(
        table: &str,
        primary_key: Option<String>,
        data: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            table: table.to_string(),
            primary_key,
            clean: Some(data.clone()),
            data,
        }
    }

    /// Owning table.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Primary key value, when the row has one.
    pub fn id(&self) -> Option<&Value> {
        let pk = self.primary_key.as_deref()?;
        self.data.get(pk).filter(|v| !v.is_null())
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.data.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.data.get(column).and_then(Value::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.data.get(column).and_then(Value::as_str)
    }

    /// Set one column.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> DataResult<()> {
        let value = value.into();
        if self.primary_key.as_deref() == Some(column) {
            if let Some(current) = self.id() {
                if *current != value {
                    return Err(DataError::config(format!(
                        "primary key {} of {} row is immutable",
                        column, self.table
                    )));
                }
            }
        }
        self.data.insert(column.to_string(), value);
        Ok(())
    }

    /// Set several columns. Stops at the first rejected column.
    pub fn assign<K: AsRef<str>>(
        &mut self,
        values: impl IntoIterator<Item = (K, Value)>,
    ) -> DataResult<()> {
        for (column, value) in values {
            self.set(column.as_ref(), value)?;
        }
        Ok(())
    }

    pub fn is_persisted(&self) -> bool {
        self.clean.is_some()
    }

    /// Columns changed since the row was loaded or last saved.
    pub fn dirty_columns(&self) -> Vec<&str> {
        match &self.clean {
            None => self.data.keys().map(String::as_str).collect(),
            Some(clean) => self
                .data
                .iter()
                .filter(|(k, v)| clean.get(*k) != Some(*v))
                .map(|(k, _)| k.as_str())
                .collect(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_columns().is_empty()
    }

    pub fn to_map(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.data
    }

    /// Persist through the owning gateway.
    pub fn save(&mut self, gateway: &TableGateway) -> DataResult<()> {
        gateway.save(self)
    }

    /// Remove through the owning gateway.
    pub fn delete(self, gateway: &TableGateway) -> DataResult<usize> {
        gateway.delete_row(&self)
    }

    pub(crate) fn mark_clean(&mut self) {
        self.clean = Some(self.data.clone());
    }
}

impl std::ops::Index<&str> for Row {
    type Output = Value;

    /// Missing columns read as null.
    fn index(&self, column: &str) -> &Value {
        self.data.get(column).unwrap_or(&NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn loaded_role() -> Row {
        let data = BTreeMap::from([
            ("id".to_string(), json!(7)),
            ("name".to_string(), json!("editor")),
            ("title".to_string(), json!("Editor")),
        ]);
        Row::loaded("role", Some("id".to_string()), data)
    }

    #[test]
    fn primary_key_is_immutable_once_set() {
        let mut row = loaded_role();
        assert!(row.set("id", 8).is_err());
        // same value is a no-op
        row.set("id", 7).unwrap();
        assert!(!row.is_dirty());

        let mut fresh = Row::detached("role", Some("id".to_string()), BTreeMap::new());
        fresh.set("id", 3).unwrap();
        assert!(fresh.set("id", 4).is_err());
    }

    #[test]
    fn dirty_tracking_reports_changed_columns_only() {
        let mut row = loaded_role();
        assert!(!row.is_dirty());
        row.assign([("title", json!("Chief editor"))]).unwrap();
        assert_eq!(row.dirty_columns(), vec!["title"]);
        row.mark_clean();
        assert!(!row.is_dirty());
        assert_eq!(row["title"], json!("Chief editor"));
        assert_eq!(row["missing"], Value::Null);
    }
}
