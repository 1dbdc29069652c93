//! Shared fixtures: the User / Car / Seller model on the in-memory ORM.

#![allow(dead_code)]

use orm_admin_adapter::config::DefaultValue;
use orm_admin_adapter::{resolve, EntitySchema, FieldSchema, MemoryOrm, Orm, Params, RecordValue, ReferenceKind, Resource};
use serde_json::json;
use std::sync::Arc;

pub fn schemas() -> Vec<EntitySchema> {
    vec![
        EntitySchema::new("User")
            .field(FieldSchema::primary("id", "serial"))
            .field(FieldSchema::scalar("firstName", "text"))
            .field(FieldSchema::scalar("lastName", "text").nullable())
            .field(FieldSchema::relation("cars", ReferenceKind::OneToMany, "Car")),
        EntitySchema::new("Seller")
            .field(FieldSchema::primary("id", "uuid").with_default(DefaultValue::Expression("gen_random_uuid()".into())))
            .field(FieldSchema::scalar("name", "text")),
        EntitySchema::new("Car")
            .table("cars")
            .field(FieldSchema::primary("id", "serial"))
            .field(FieldSchema::scalar("name", "text"))
            .field(FieldSchema::scalar("meta", "jsonb").with_default(DefaultValue::Value(json!({}))))
            .field(
                FieldSchema::scalar("createdAt", "timestamptz")
                    .with_default(DefaultValue::Expression("now()".into())),
            )
            .field(
                FieldSchema::scalar("updatedAt", "timestamptz")
                    .with_default(DefaultValue::Expression("now()".into()))
                    .on_update("now()"),
            )
            .field(FieldSchema::relation("owner", ReferenceKind::ManyToOne, "User").nullable())
            .field(FieldSchema::relation("seller", ReferenceKind::ManyToOne, "Seller").nullable()),
        // No primary key.
        EntitySchema::new("AuditEntry").field(FieldSchema::scalar("message", "text")),
    ]
}

pub fn memory_orm() -> MemoryOrm {
    match resolve(&schemas()) {
        Ok(storage) => MemoryOrm::new(storage).with_database_name("cars_test"),
        Err(e) => panic!("fixture schemas must resolve: {}", e),
    }
}

pub fn resource(orm: &MemoryOrm, model: &str) -> Resource {
    let orm: Arc<dyn Orm> = Arc::new(orm.clone());
    Resource::new(orm, model)
}

pub fn params<const N: usize>(pairs: [(&str, RecordValue); N]) -> Params {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Creates cars with the given names, in order; returns their ids.
pub async fn seed_cars(cars: &Resource, names: &[&str]) -> Vec<RecordValue> {
    let mut ids = Vec::new();
    for name in names {
        let created = cars
            .create(params([("name", RecordValue::from(*name))]))
            .await
            .unwrap_or_else(|e| panic!("seeding {} failed: {}", name, e));
        ids.push(created.get("id").cloned().unwrap_or(RecordValue::Null));
    }
    ids
}
