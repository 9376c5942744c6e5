//! Input validators backed by stored data.

use crate::db::Where;
use crate::error::{DataError, DataResult, ValidationError};
use crate::gateway::TableGateway;

pub const ROUTE_EXISTS: &str = "routeExists";

/// Rejects a route name that is already taken by another route.
#[derive(Debug, Clone)]
pub struct RouteNameDuplicate {
    routes: TableGateway,
}

impl RouteNameDuplicate {
    pub fn new(routes: TableGateway) -> Self {
        Self { routes }
    }

    /// Fails with [`ROUTE_EXISTS`] when `name` is in use by a route other
    /// than `exclude_id`. A missing name always passes.
    pub fn check(&self, name: Option<&str>, exclude_id: Option<i64>) -> DataResult<()> {
        let Some(name) = name else {
            return Ok(());
        };
        let mut filter = Where::new().eq("name", name);
        if let Some(id) = exclude_id {
            filter = filter.not_eq("id", id);
        }
        if self.routes.select_one(filter)?.is_some() {
            return Err(DataError::Validation(ValidationError::new(
                ROUTE_EXISTS,
                "Route name already exists",
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self, name: Option<&str>, exclude_id: Option<i64>) -> DataResult<bool> {
        match self.check(name, exclude_id) {
            Ok(()) => Ok(true),
            Err(DataError::Validation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::{ModelKind, Models};
    use crate::observer::ObserverHub;
    use serde_json::json;
    use std::sync::Arc;

    fn validator() -> (RouteNameDuplicate, i64) {
        let db = Database::memory().unwrap();
        db.init_schema("").unwrap();
        let models = Models::new(&db, "", Arc::new(ObserverHub::new())).unwrap();
        let gw = models.get(ModelKind::Route).clone();
        let mut row = gw.create_row([("name", json!("home")), ("section", json!("front"))]);
        gw.save(&mut row).unwrap();
        let id = row.id().and_then(|v| v.as_i64()).unwrap();
        (RouteNameDuplicate::new(gw), id)
    }

    #[test]
    fn taken_name_is_rejected() {
        let (validator, _) = validator();
        match validator.check(Some("home"), None) {
            Err(DataError::Validation(err)) => {
                assert_eq!(err.rule, ROUTE_EXISTS);
                assert_eq!(err.message, "Route name already exists");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn own_id_and_free_names_pass() {
        let (validator, id) = validator();
        assert!(validator.is_valid(Some("home"), Some(id)).unwrap());
        assert!(validator.is_valid(Some("feed"), None).unwrap());
        assert!(validator.is_valid(None, None).unwrap());
        assert!(!validator.is_valid(Some("home"), Some(id + 1)).unwrap());
    }
}
