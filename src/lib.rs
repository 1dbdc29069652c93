//! ORM admin adapter: exposes ORM-managed entities through a generic admin-panel resource contract.

mod case;
pub mod config;
pub mod error;
pub mod filter;
pub mod orm;
pub mod property;
pub mod record;
pub mod service;
pub mod sql;
pub mod store;

pub use config::{load_from_json, load_from_path, resolve, EntityMeta, EntitySchema, FieldSchema, MetadataStorage, ReferenceKind};
pub use error::{AdapterError, ConfigError, OrmError, ValidationErrors};
pub use filter::{Filter, FilterValue};
pub use orm::{Direction, MemoryOrm, Orm, PgOrm, Session};
pub use property::{Properties, Property, PropertyType};
pub use record::{BaseRecord, Params, RecordValue, ReferenceId};
pub use service::{Database, FindParams, Resource, RuleValidator, Validate, ValidationRule, Violation};
pub use store::{ensure_database_exists, ensure_tables, PgOrmConfig};
