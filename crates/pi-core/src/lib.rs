//! Data access layer for the Pi engine.
//!
//! This crate provides:
//!
//! - A table gateway with a structured query model over SQLite
//! - Rows that track their dirty columns and save through their gateway
//! - Table observers notified on update and delete
//! - Cached registries of roles and routes with explicit invalidation
//! - A per-user key/value store with module scoping and expiry
//!
//! # Quick Start
//!
//! ```no_run
//! use pi_core::{load_config, DataLayer, RouteSelector};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = load_config(None)?;
//! let layer = DataLayer::open(&config)?;
//!
//! let routes = layer.routes.read(&RouteSelector::section("front"))?;
//! println!("{} front routes", routes.len());
//!
//! layer.user_data.set(1, "theme", "dark", None, 0);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `PI_DB_PATH` | SQLite database file (default: `pi.db`) |
//! | `PI_TABLE_PREFIX` | Prefix for every table name |
//! | `PI_CACHE_DIR` | File cache directory; selects the file backend |

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod model;
pub mod module;
pub mod observer;
pub mod registry;
pub mod user_data;
pub mod validate;

// Re-export main types
pub use cache::{CacheBackend, FileCache, MemoryCache};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{load_config, CacheKind, PiConfig};
pub use db::{Database, Expr, Join, Order, Select, Set, Where};
pub use engine::DataLayer;
pub use error::{DataError, DataResult, ValidationError};
pub use gateway::{Count, CountOptions, Found, Key, Row, TableDef, TableGateway};
pub use model::{ModelKind, Models};
pub use module::{ModuleContext, DEFAULT_MODULE};
pub use observer::{ObserverHub, TableObserver};
pub use registry::{
    Registry, RegistryLoader, RoleEntry, RoleRegistry, Roles, RouteRegistry, RouteSelector, Routes,
};
pub use user_data::{UserDataEntry, UserDataQuery, UserDataRecord, UserDataStore, UserValue};
pub use validate::RouteNameDuplicate;
