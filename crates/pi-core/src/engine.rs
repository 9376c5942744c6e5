//! Wiring of the data layer from configuration.

use crate::cache::{self, CacheBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::PiConfig;
use crate::db::Database;
use crate::error::DataResult;
use crate::model::{ModelKind, Models};
use crate::module::ModuleContext;
use crate::observer::ObserverHub;
use crate::registry::{Registry, RoleLoader, RoleRegistry, RouteLoader, RouteRegistry};
use crate::user_data::UserDataStore;
use crate::validate::RouteNameDuplicate;
use std::sync::Arc;
use tracing::info;

/// Everything a caller needs, sharing one database, cache and observer hub.
pub struct DataLayer {
    pub db: Database,
    pub models: Models,
    pub cache: Arc<dyn CacheBackend>,
    pub modules: Arc<ModuleContext>,
    pub roles: RoleRegistry,
    pub routes: RouteRegistry,
    pub user_data: UserDataStore,
}

impl DataLayer {
    /// Open the configured database, create missing tables and build the
    /// registries over the configured cache backend.
    pub fn open(config: &PiConfig) -> DataResult<Self> {
        let db = Database::open(&config.database.path)?;
        let cache = cache::from_config(&config.cache)?;
        Self::assemble(db, cache, config, Arc::new(SystemClock))
    }

    /// Build over an existing database and cache.
    pub fn assemble(
        db: Database,
        cache: Arc<dyn CacheBackend>,
        config: &PiConfig,
        clock: Arc<dyn Clock>,
    ) -> DataResult<Self> {
        let prefix = config.database.table_prefix.as_str();
        db.init_schema(prefix)?;
        let models = Models::new(&db, prefix, Arc::new(ObserverHub::new()))?;
        let modules = Arc::new(ModuleContext::new(config.module.default.clone()));

        let roles = Registry::new(
            RoleLoader::new(models.get(ModelKind::Role).clone()),
            cache.clone(),
        );
        let routes = Registry::new(
            RouteLoader::new(models.get(ModelKind::Route).clone()),
            cache.clone(),
        );
        let user_data = UserDataStore::new(
            models.get(ModelKind::UserData).clone(),
            modules.clone(),
            clock,
        );
        info!(
            path = %config.database.path.display(),
            prefix,
            backend = ?config.cache.backend,
            "data layer ready"
        );

        Ok(Self {
            db,
            models,
            cache,
            modules,
            roles,
            routes,
            user_data,
        })
    }

    pub fn route_name_validator(&self) -> RouteNameDuplicate {
        RouteNameDuplicate::new(self.models.get(ModelKind::Route).clone())
    }
}
