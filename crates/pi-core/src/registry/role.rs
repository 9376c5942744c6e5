use super::{Registry, RegistryLoader};
use crate::db::{Order, Select, Where};
use crate::error::DataResult;
use crate::gateway::TableGateway;
use serde::{Deserialize, Serialize};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub section: String,
    pub title: String,
    pub id: i64,
}

/// Active roles by name, ordered by section then title.
pub type Roles = IndexMap<String, RoleEntry>;

pub type RoleRegistry = Registry<RoleLoader>;

/// Loads active roles, optionally limited to one section.
///
/// Selector: section name, empty for every section. Any role change may
/// affect every section list, so clearing always drops the whole family.
#[derive(Debug, Clone)]
pub struct RoleLoader {
    roles: TableGateway,
}

impl RoleLoader {
    pub fn new(roles: TableGateway) -> Self {
        Self { roles }
    }
}

impl RegistryLoader for RoleLoader {
    type Selector = String;
    type Data = Roles;

    fn name(&self) -> &'static str {
        "role"
    }

    fn namespace(&self, section: &String) -> String {
        section.clone()
    }

    fn load(&self, section: &String) -> DataResult<Roles> {
        let mut filter = Where::new().eq("active", 1);
        if !section.is_empty() {
            filter = filter.eq("section", section.as_str());
        }
        let select = Select::new()
            .filter(filter)
            .order_by("section", Order::Asc)
            .order_by("title", Order::Asc);

        let mut roles = Roles::new();
        for row in self.roles.select_with(&select)? {
            let Some(name) = row.get_str("name") else {
                continue;
            };
            roles.insert(
                name.to_string(),
                RoleEntry {
                    section: row.get_str("section").unwrap_or_default().to_string(),
                    title: row.get_str("title").unwrap_or_default().to_string(),
                    id: row.get_i64("id").unwrap_or_default(),
                },
            );
        }
        Ok(roles)
    }

    fn clear_whole_family(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::Database;
    use crate::model::{ModelKind, Models};
    use crate::observer::ObserverHub;
    use std::sync::Arc;

    fn seeded() -> (RoleRegistry, TableGateway) {
        let db = Database::memory().unwrap();
        db.init_schema("").unwrap();
        let models = Models::new(&db, "", Arc::new(ObserverHub::new())).unwrap();
        let gw = models.get(ModelKind::Role).clone();
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO role (name, title, section, active) VALUES
                    ('webmaster', 'Webmaster', 'admin', 1),
                    ('staff', 'Staff', 'admin', 1),
                    ('member', 'Member', 'front', 1),
                    ('banned', 'Banned', 'front', 0);",
            )?;
            Ok(())
        })
        .unwrap();
        let registry = Registry::new(RoleLoader::new(gw.clone()), Arc::new(MemoryCache::new()));
        (registry, gw)
    }

    #[test]
    fn loads_active_roles_by_section() {
        let (registry, _) = seeded();
        let all = registry.read(&String::new()).unwrap();
        assert_eq!(all.len(), 3);
        assert!(!all.contains_key("banned"));

        let admin = registry.read(&"admin".to_string()).unwrap();
        assert_eq!(admin.len(), 2);
        assert_eq!(
            admin["staff"],
            RoleEntry {
                section: "admin".into(),
                title: "Staff".into(),
                id: 2
            }
        );
    }

    #[test]
    fn roles_keep_section_and_title_order_through_the_cache() {
        let (registry, gw) = seeded();
        for (name, title) in [("zeta", "A first"), ("alpha", "Z last")] {
            let mut row = gw.create_row([
                ("name", serde_json::json!(name)),
                ("title", serde_json::json!(title)),
                ("section", serde_json::json!("admin")),
            ]);
            gw.save(&mut row).unwrap();
        }
        let expected = vec!["zeta", "staff", "webmaster", "alpha"];
        let loaded = registry.read(&"admin".to_string()).unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), expected);
        let cached = registry.read(&"admin".to_string()).unwrap();
        assert_eq!(cached.keys().collect::<Vec<_>>(), expected);

        let all = registry.read(&String::new()).unwrap();
        assert_eq!(
            all.keys().collect::<Vec<_>>(),
            vec!["zeta", "staff", "webmaster", "alpha", "member"]
        );
    }

    #[test]
    fn clearing_any_section_drops_all_role_lists() {
        let (registry, gw) = seeded();
        registry.read(&"admin".to_string()).unwrap();
        registry.read(&"front".to_string()).unwrap();

        gw.update(
            &crate::db::Set::new().value("active", 1),
            Some(&Where::new().eq("name", "banned")),
        )
        .unwrap();
        assert_eq!(registry.read(&"front".to_string()).unwrap().len(), 1);

        registry.clear("admin").unwrap();
        assert_eq!(registry.read(&"front".to_string()).unwrap().len(), 2);
    }
}
