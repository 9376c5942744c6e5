use super::{Registry, RegistryLoader};
use crate::db::{Order, Select, Where};
use crate::error::DataResult;
use crate::gateway::TableGateway;
use serde_json::{Map, Value};
use indexmap::IndexMap;

/// Route specs by route name, in table order.
pub type Routes = IndexMap<String, Value>;

pub type RouteRegistry = Registry<RouteLoader>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteSelector {
    pub section: String,
    /// Load every section except `section`.
    pub exclude: bool,
}

impl RouteSelector {
    pub fn section(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            exclude: false,
        }
    }

    pub fn excluding(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            exclude: true,
        }
    }
}

impl Default for RouteSelector {
    fn default() -> Self {
        Self::section("front")
    }
}

/// Loads active routes of a section, including section-less routes.
#[derive(Debug, Clone)]
pub struct RouteLoader {
    routes: TableGateway,
}

impl RouteLoader {
    pub fn new(routes: TableGateway) -> Self {
        Self { routes }
    }
}

impl RegistryLoader for RouteLoader {
    type Selector = RouteSelector;
    type Data = Routes;

    fn name(&self) -> &'static str {
        "route"
    }

    fn namespace(&self, selector: &RouteSelector) -> String {
        if selector.exclude {
            format!("!{}", selector.section)
        } else {
            selector.section.clone()
        }
    }

    fn load(&self, selector: &RouteSelector) -> DataResult<Routes> {
        let section = selector.section.as_str();
        let filter = if selector.exclude {
            Where::new().eq("active", 1).not_eq("section", section)
        } else {
            Where::new()
                .eq("active", 1)
                .nest(Where::any().eq("section", section).eq("section", ""))
        };

        let mut routes = Routes::new();
        let select = Select::new().filter(filter).order_by("id", Order::Asc);
        for row in self.routes.select_with(&select)? {
            let Some(name) = row.get_str("name") else {
                continue;
            };
            let mut spec = match row.get("data") {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            let priority = row.get_i64("priority").unwrap_or_default();
            if priority != 0 {
                spec.insert("priority".to_string(), Value::from(priority));
            }
            routes.insert(name.to_string(), Value::Object(spec));
        }
        Ok(routes)
    }
}
