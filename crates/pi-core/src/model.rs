//! Table gateways for the core tables, resolved once at startup.

use crate::db::Database;
use crate::error::DataResult;
use crate::gateway::{TableDef, TableGateway};
use crate::observer::ObserverHub;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    Role,
    Route,
    UserData,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Role, ModelKind::Route, ModelKind::UserData];

    pub fn table_def(self) -> TableDef {
        match self {
            ModelKind::Role => TableDef::new("role").primary_key("id"),
            ModelKind::Route => TableDef::new("route").primary_key("id").encode(["data"]),
            ModelKind::UserData => TableDef::new("user_data")
                .primary_key("id")
                .columns([
                    "id",
                    "uid",
                    "module",
                    "name",
                    "time",
                    "expire",
                    "value",
                    "value_int",
                    "value_multi",
                ])
                .encode(["value_multi"]),
        }
    }
}

/// One gateway per [`ModelKind`], sharing a database and observer hub.
#[derive(Debug, Clone)]
pub struct Models {
    role: TableGateway,
    route: TableGateway,
    user_data: TableGateway,
    observers: Arc<ObserverHub>,
}

impl Models {
    pub fn new(db: &Database, prefix: &str, observers: Arc<ObserverHub>) -> DataResult<Self> {
        let build = |kind: ModelKind| {
            TableGateway::new(db.clone(), kind.table_def(), prefix, observers.clone())
        };
        Ok(Self {
            role: build(ModelKind::Role)?,
            route: build(ModelKind::Route)?,
            user_data: build(ModelKind::UserData)?,
            observers: observers.clone(),
        })
    }

    pub fn get(&self, kind: ModelKind) -> &TableGateway {
        match kind {
            ModelKind::Role => &self.role,
            ModelKind::Route => &self.route,
            ModelKind::UserData => &self.user_data,
        }
    }

    pub fn observers(&self) -> &Arc<ObserverHub> {
        &self.observers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateways_carry_the_table_prefix() {
        let db = Database::memory().unwrap();
        db.init_schema("pi_").unwrap();
        let models = Models::new(&db, "pi_", Arc::new(ObserverHub::new())).unwrap();
        for kind in ModelKind::ALL {
            let gw = models.get(kind);
            assert!(gw.table().starts_with("pi_"));
            assert_eq!(gw.primary_key(), Some("id"));
        }
        assert!(models
            .get(ModelKind::Route)
            .def()
            .encode_columns
            .contains("data"));
    }
}
