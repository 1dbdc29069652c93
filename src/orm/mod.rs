//! ORM seam: metadata access, per-operation sessions and entity instances.
//!
//! The resource adapter only talks to storage through [`Orm`] and [`Session`].
//! Backends: [`MemoryOrm`] (in-process tables) and [`PgOrm`] (PostgreSQL via sqlx).

mod condition;
mod memory;
mod postgres;

pub use condition::{Condition, Direction, FindOptions, OrderBy};
pub use memory::MemoryOrm;
pub use postgres::{PgOrm, PgSession};
pub(crate) use postgres::map_sqlx_error;

use crate::config::{EntityMeta, MetadataStorage};
use crate::error::OrmError;
use crate::record::get_path;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One entity's state inside a session, as a plain nested object keyed by property name.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityInstance {
    entity: String,
    data: Map<String, Value>,
    managed: bool,
    /// Primary key the stored row was loaded or inserted under.
    identity: Option<Value>,
}

impl EntityInstance {
    /// New, not yet persisted instance.
    pub fn new(entity: &str, data: Map<String, Value>) -> Self {
        EntityInstance {
            entity: entity.to_string(),
            data,
            managed: false,
            identity: None,
        }
    }

    /// Instance loaded from storage.
    pub fn managed(entity: &EntityMeta, data: Map<String, Value>) -> Self {
        let mut instance = EntityInstance::new(&entity.name, Map::new());
        instance.hydrate(entity, data);
        instance
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.data, path)
    }

    pub fn primary_key(&self, meta: &EntityMeta) -> Option<&Value> {
        meta.primary_key()
            .and_then(|pk| self.data.get(&pk.name))
            .filter(|v| !v.is_null())
    }

    /// Row this instance is bound to in storage. Unlike [`Self::primary_key`] it
    /// does not follow later assignments.
    pub fn identity(&self) -> Option<&Value> {
        self.identity.as_ref()
    }

    /// Merges `shape` into the instance. Nested objects merge key by key; fields
    /// absent from `shape` are left untouched.
    pub fn assign(&mut self, shape: Map<String, Value>) {
        for (k, v) in shape {
            match self.data.get_mut(&k) {
                Some(current) => merge_json(current, v),
                None => {
                    self.data.insert(k, v);
                }
            }
        }
    }

    /// Replaces the state with what storage returned after a flush.
    pub fn hydrate(&mut self, entity: &EntityMeta, data: Map<String, Value>) {
        self.data = data;
        self.managed = true;
        self.identity = self.primary_key(entity).cloned();
    }

    /// Plain nested object projection.
    pub fn to_object(&self) -> Map<String, Value> {
        self.data.clone()
    }
}

fn merge_json(current: &mut Value, incoming: Value) {
    match (current, incoming) {
        (Value::Object(cur), Value::Object(inc)) if !inc.is_empty() => {
            for (k, v) in inc {
                match cur.get_mut(&k) {
                    Some(slot) => merge_json(slot, v),
                    None => {
                        cur.insert(k, v);
                    }
                }
            }
        }
        (slot, inc) => *slot = inc,
    }
}

/// Shared ORM handle. Read-only after construction; safe to share across requests.
#[async_trait]
pub trait Orm: Send + Sync {
    fn metadata(&self) -> &MetadataStorage;

    /// Backend identifier, e.g. "postgresql".
    fn driver_name(&self) -> &'static str;

    fn database_name(&self) -> Option<String>;

    /// Fresh, isolated unit of work for one operation.
    async fn fork(&self) -> Result<Box<dyn Session>, OrmError>;
}

/// Unit of work bound to a single adapter operation. Dropped when the operation ends.
#[async_trait]
pub trait Session: Send {
    async fn count(&mut self, entity: &EntityMeta, condition: &Condition) -> Result<u64, OrmError>;

    async fn find(
        &mut self,
        entity: &EntityMeta,
        condition: &Condition,
        options: &FindOptions,
    ) -> Result<Vec<EntityInstance>, OrmError>;

    async fn find_one(&mut self, entity: &EntityMeta, pk: &Value) -> Result<Option<EntityInstance>, OrmError> {
        let Some(pk_field) = entity.primary_key() else {
            return Ok(None);
        };
        let options = FindOptions {
            limit: Some(1),
            ..FindOptions::default()
        };
        let condition = Condition::Eq(pk_field.name.clone(), pk.clone());
        let mut rows = self.find(entity, &condition, &options).await?;
        Ok(rows.pop())
    }

    /// Instantiates (does not persist) an entity from a nested shape. Keys that
    /// are not stored fields of the entity are dropped.
    fn create(&mut self, entity: &EntityMeta, shape: Map<String, Value>) -> EntityInstance {
        let data = shape
            .into_iter()
            .filter(|(k, _)| entity.field(k).map(|f| f.kind.has_column()).unwrap_or(false))
            .collect();
        EntityInstance::new(&entity.name, data)
    }

    /// Deletes by primary key without loading; returns the number of rows removed.
    async fn native_delete(&mut self, entity: &EntityMeta, pk: &Value) -> Result<u64, OrmError>;

    /// Inserts or updates the instance and commits; refreshes it with stored values.
    async fn persist_and_flush(&mut self, entity: &EntityMeta, instance: &mut EntityInstance) -> Result<(), OrmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, EntitySchema, FieldSchema};
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    fn car() -> EntityMeta {
        let storage = resolve(&[EntitySchema::new("Car")
            .field(FieldSchema::primary("id", "serial"))
            .field(FieldSchema::scalar("name", "text"))
            .field(FieldSchema::scalar("meta", "jsonb"))])
        .unwrap();
        (**storage.find("Car").unwrap()).clone()
    }

    #[test]
    fn assign_is_partial_and_merges_nested_objects() {
        let mut car = EntityInstance::managed(&car(), obj(json!({ "id": 1, "name": "Civic", "meta": { "title": "Sedan", "doors": 4 } })));
        car.assign(obj(json!({ "meta": { "title": "Coupe" } })));
        assert_eq!(
            Value::Object(car.to_object()),
            json!({ "id": 1, "name": "Civic", "meta": { "title": "Coupe", "doors": 4 } })
        );
        car.assign(obj(json!({ "name": "Accord" })));
        assert_eq!(car.get("name"), Some(&json!("Accord")));
        assert_eq!(car.get("meta.doors"), Some(&json!(4)));
    }

    #[test]
    fn identity_stays_with_the_loaded_row() {
        let meta = car();
        let mut car = EntityInstance::managed(&meta, obj(json!({ "id": 1, "name": "Civic" })));
        car.assign(obj(json!({ "id": 2 })));
        assert_eq!(car.primary_key(&meta), Some(&json!(2)));
        assert_eq!(car.identity(), Some(&json!(1)));
        assert_eq!(EntityInstance::new("Car", Map::new()).identity(), None);
    }
}
