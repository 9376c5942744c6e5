//! Per-user key/value data.
//!
//! Items are keyed by `(uid, name, module)`. The value lives in exactly one
//! of three columns: `value_int` for integers, `value` for strings and
//! `value_multi` (JSON) for everything else. `expire` is an absolute unix
//! time, 0 for items that never expire. Expired items are invisible to reads
//! and removed by [`UserDataStore::gc`].

use crate::clock::Clock;
use crate::db::{Expr, Set, Where};
use crate::error::DataResult;
use crate::gateway::{Row, TableGateway};
use crate::module::ModuleContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserValue {
    Int(i64),
    Scalar(String),
    Structured(Value),
}

impl UserValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            UserValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn from_row(row: &Row) -> Self {
        if let Some(i) = row.get_i64("value_int") {
            return UserValue::Int(i);
        }
        match row.get("value") {
            Some(Value::String(s)) => UserValue::Scalar(s.clone()),
            Some(v) if !v.is_null() => UserValue::Scalar(v.to_string()),
            _ => UserValue::Structured(row["value_multi"].clone()),
        }
    }

    /// Column values for `value`, `value_int`, `value_multi`.
    fn columns(&self) -> [(&'static str, Value); 3] {
        let (value, value_int, value_multi) = match self {
            UserValue::Int(i) => (Value::Null, Value::from(*i), Value::Null),
            UserValue::Scalar(s) => (Value::String(s.clone()), Value::Null, Value::Null),
            UserValue::Structured(v) => (Value::Null, Value::Null, v.clone()),
        };
        [
            ("value", value),
            ("value_int", value_int),
            ("value_multi", value_multi),
        ]
    }
}

impl From<i64> for UserValue {
    fn from(i: i64) -> Self {
        UserValue::Int(i)
    }
}

impl From<i32> for UserValue {
    fn from(i: i32) -> Self {
        UserValue::Int(i64::from(i))
    }
}

impl From<&str> for UserValue {
    fn from(s: &str) -> Self {
        UserValue::Scalar(s.to_string())
    }
}

impl From<String> for UserValue {
    fn from(s: String) -> Self {
        UserValue::Scalar(s)
    }
}

impl From<Value> for UserValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Number(n) => match n.as_i64() {
                Some(i) => UserValue::Int(i),
                None => UserValue::Scalar(n.to_string()),
            },
            Value::Bool(b) => UserValue::Scalar(if b { "1" } else { "0" }.to_string()),
            Value::String(s) => UserValue::Scalar(s),
            other => UserValue::Structured(other),
        }
    }
}

/// A live item with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDataEntry {
    pub time: i64,
    pub value: UserValue,
    pub module: String,
}

/// One write, for callers that assemble items as records.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDataRecord {
    pub uid: i64,
    pub name: String,
    pub value: UserValue,
    pub module: Option<String>,
    /// Seconds to live; 0 never expires.
    pub ttl: i64,
}

/// Conditions for [`UserDataStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserDataQuery {
    pub uid: Option<i64>,
    pub name: Option<String>,
    pub module: Option<String>,
    pub value: Option<UserValue>,
}

pub struct UserDataStore {
    data: TableGateway,
    modules: Arc<ModuleContext>,
    clock: Arc<dyn Clock>,
}

impl UserDataStore {
    pub fn new(data: TableGateway, modules: Arc<ModuleContext>, clock: Arc<dyn Clock>) -> Self {
        Self {
            data,
            modules,
            clock,
        }
    }

    pub fn gateway(&self) -> &TableGateway {
        &self.data
    }

    fn key_filter(uid: i64, name: &str, module: &str) -> Where {
        Where::new()
            .eq("uid", uid)
            .eq("name", name)
            .eq("module", module)
    }

    fn expiry(&self, ttl: i64) -> i64 {
        if ttl != 0 {
            self.clock.now().saturating_add(ttl)
        } else {
            0
        }
    }

    fn is_live(&self, row: &Row) -> bool {
        let expire = row.get_i64("expire").unwrap_or_default();
        expire == 0 || expire > self.clock.now()
    }

    fn live_filter(&self) -> Where {
        Where::any()
            .eq("expire", 0)
            .gt("expire", self.clock.now())
    }

    fn entry(row: &Row) -> UserDataEntry {
        UserDataEntry {
            time: row.get_i64("time").unwrap_or_default(),
            value: UserValue::from_row(row),
            module: row.get_str("module").unwrap_or_default().to_string(),
        }
    }

    /// Live value of one item.
    pub fn get(&self, uid: i64, name: &str, module: Option<&str>) -> DataResult<Option<UserValue>> {
        Ok(self.get_detail(uid, name, module)?.map(|e| e.value))
    }

    /// Live item with write time and module.
    pub fn get_detail(
        &self,
        uid: i64,
        name: &str,
        module: Option<&str>,
    ) -> DataResult<Option<UserDataEntry>> {
        let module = self.modules.resolve(module);
        let row = self.data.select_one(Self::key_filter(uid, name, &module))?;
        Ok(row.filter(|r| self.is_live(r)).map(|r| Self::entry(&r)))
    }

    /// Live values for several users; users without a live item are absent.
    pub fn get_many(
        &self,
        uids: &[i64],
        name: &str,
        module: Option<&str>,
    ) -> DataResult<BTreeMap<i64, UserValue>> {
        Ok(self
            .get_many_detail(uids, name, module)?
            .into_iter()
            .map(|(uid, e)| (uid, e.value))
            .collect())
    }

    pub fn get_many_detail(
        &self,
        uids: &[i64],
        name: &str,
        module: Option<&str>,
    ) -> DataResult<BTreeMap<i64, UserDataEntry>> {
        let module = self.modules.resolve(module);
        let filter = Where::new()
            .is_in("uid", uids.iter().copied())
            .eq("name", name)
            .eq("module", module);
        let mut out = BTreeMap::new();
        for row in self.data.select(filter)? {
            if !self.is_live(&row) {
                continue;
            }
            if let Some(uid) = row.get_i64("uid") {
                out.insert(uid, Self::entry(&row));
            }
        }
        Ok(out)
    }

    /// Upsert an item; `ttl` seconds to live, 0 for no expiry.
    pub fn set(
        &self,
        uid: i64,
        name: &str,
        value: impl Into<UserValue>,
        module: Option<&str>,
        ttl: i64,
    ) -> bool {
        let module = self.modules.resolve(module);
        let value = value.into();
        match self.try_set(uid, name, &value, &module, ttl) {
            Ok(()) => true,
            Err(e) => {
                warn!(uid, name, module = %module, error = %e, "user data write failed");
                false
            }
        }
    }

    pub fn set_int(&self, uid: i64, name: &str, value: i64, module: Option<&str>, ttl: i64) -> bool {
        self.set(uid, name, UserValue::Int(value), module, ttl)
    }

    pub fn set_record(&self, record: &UserDataRecord) -> bool {
        self.set(
            record.uid,
            &record.name,
            record.value.clone(),
            record.module.as_deref(),
            record.ttl,
        )
    }

    fn try_set(&self, uid: i64, name: &str, value: &UserValue, module: &str, ttl: i64) -> DataResult<()> {
        let now = self.clock.now();
        let mut vars = vec![
            ("uid", Value::from(uid)),
            ("name", Value::from(name)),
            ("module", Value::from(module)),
            ("time", Value::from(now)),
            ("expire", Value::from(self.expiry(ttl))),
        ];
        vars.extend(value.columns());

        let mut row = match self.data.select_one(Self::key_filter(uid, name, module))? {
            Some(mut row) => {
                row.assign(vars)?;
                row
            }
            None => self.data.create_row(vars),
        };
        row.save(&self.data)
    }

    /// Add `delta` to an integer item.
    ///
    /// A missing item is created with `delta`. A zero `delta`, or an item
    /// without an integer value, resets the item to `delta`. Expiry is
    /// refreshed from `ttl` in every case.
    pub fn increment(&self, uid: i64, name: &str, delta: i64, module: Option<&str>, ttl: i64) -> bool {
        let module = self.modules.resolve(module);
        match self.try_increment(uid, name, delta, &module, ttl) {
            Ok(()) => true,
            Err(e) => {
                warn!(uid, name, module = %module, error = %e, "user data increment failed");
                false
            }
        }
    }

    fn try_increment(&self, uid: i64, name: &str, delta: i64, module: &str, ttl: i64) -> DataResult<()> {
        let filter = Self::key_filter(uid, name, module);
        let expire = self.expiry(ttl);
        match self.data.select_one(filter.clone())? {
            None => self.try_set(uid, name, &UserValue::Int(delta), module, ttl),
            Some(mut row) if delta == 0 || row["value_int"].is_null() => {
                row.assign(UserValue::Int(delta).columns())?;
                row.set("expire", expire)?;
                row.save(&self.data)
            }
            Some(_) => {
                let operator = if delta > 0 { '+' } else { '-' };
                let set = Set::new()
                    .expr(
                        "value_int",
                        Expr::new(format!("\"value_int\" {} {}", operator, delta.unsigned_abs())),
                    )
                    .value("expire", expire);
                self.data.update(&set, Some(&filter))?;
                Ok(())
            }
        }
    }

    /// Remove an item for each of `uids`.
    pub fn delete(&self, uids: &[i64], name: &str, module: Option<&str>) -> bool {
        let module = self.modules.resolve(module);
        let filter = Where::new()
            .is_in("uid", uids.iter().copied())
            .eq("name", name)
            .eq("module", module.as_str());
        match self.data.delete(&filter) {
            Ok(_) => true,
            Err(e) => {
                warn!(name, module = %module, error = %e, "user data delete failed");
                false
            }
        }
    }

    /// First live item matching `query`. An integer value matches `value_int`.
    pub fn find(&self, query: &UserDataQuery) -> DataResult<Option<Row>> {
        let mut filter = Where::new();
        if let Some(uid) = query.uid {
            filter = filter.eq("uid", uid);
        }
        if let Some(name) = &query.name {
            filter = filter.eq("name", name.as_str());
        }
        if let Some(module) = &query.module {
            filter = filter.eq("module", module.as_str());
        }
        match &query.value {
            Some(UserValue::Int(i)) => filter = filter.eq("value_int", *i),
            Some(UserValue::Scalar(s)) => filter = filter.eq("value", s.as_str()),
            Some(UserValue::Structured(v)) => filter = filter.eq("value_multi", v.to_string()),
            None => {}
        }
        self.data.select_one(filter.nest(self.live_filter()))
    }

    /// Delete every expired item; returns how many were removed.
    pub fn gc(&self) -> DataResult<usize> {
        let filter = Where::new()
            .not_eq("expire", 0)
            .lt("expire", self.clock.now());
        let removed = self.data.delete(&filter)?;
        tracing::info!(removed, "user data gc");
        Ok(removed)
    }
}
