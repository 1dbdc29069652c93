//! Build the metadata lookup table from schema structs or JSON documents.

use crate::case::to_snake_case;
use crate::config::resolved::{EntityMeta, FieldMeta, MetadataStorage};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Build resolved metadata from entity schemas (validates first).
pub fn resolve(schemas: &[EntitySchema]) -> Result<MetadataStorage, ConfigError> {
    validate(schemas)?;

    let pk_type_by_entity: HashMap<&str, String> = schemas
        .iter()
        .filter_map(|e| {
            e.fields
                .iter()
                .find(|f| f.primary)
                .map(|f| (e.name.as_str(), declared_type(f)))
        })
        .collect();

    let entities = schemas
        .iter()
        .map(|e| {
            let fields: Vec<FieldMeta> = e
                .fields
                .iter()
                .map(|f| resolve_field(f, &pk_type_by_entity))
                .collect();
            let primary_keys = fields
                .iter()
                .filter(|f| f.primary)
                .map(|f| f.name.clone())
                .collect();
            EntityMeta {
                name: e.name.clone(),
                class_name: e.class_name.clone().unwrap_or_else(|| e.name.clone()),
                schema: e.schema.clone(),
                table: e.table.clone().unwrap_or_else(|| to_snake_case(&e.name)),
                fields,
                primary_keys,
            }
        })
        .collect();

    Ok(MetadataStorage::new(entities))
}

/// Parse a JSON array of entity schemas and resolve it.
pub fn load_from_json(json: &str) -> Result<MetadataStorage, ConfigError> {
    let schemas: Vec<EntitySchema> = serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    resolve(&schemas)
}

pub async fn load_from_path(path: impl AsRef<Path>) -> Result<MetadataStorage, ConfigError> {
    let path = path.as_ref();
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    load_from_json(&json)
}

fn declared_type(f: &FieldSchema) -> String {
    f.column_type
        .as_deref()
        .map(|t| t.trim().to_lowercase())
        .unwrap_or_else(|| "text".into())
}

fn resolve_field(f: &FieldSchema, pk_type_by_entity: &HashMap<&str, String>) -> FieldMeta {
    let column_type = match f.kind {
        ReferenceKind::ManyToMany | ReferenceKind::Embedded => "jsonb".to_string(),
        ReferenceKind::ManyToOne | ReferenceKind::OneToOne | ReferenceKind::OneToMany => f
            .reference
            .as_deref()
            .and_then(|target| pk_type_by_entity.get(target))
            .map(|t| referencing_type(t))
            .unwrap_or_else(|| "integer".into()),
        ReferenceKind::Scalar => declared_type(f),
    };
    let autoincrement = f.primary && f.default.is_none() && is_integer_type(&column_type);
    FieldMeta {
        name: f.name.clone(),
        column: f.column.clone().unwrap_or_else(|| to_snake_case(&f.name)),
        kind: f.kind,
        column_type,
        nullable: f.nullable,
        default: f.default.clone(),
        primary: f.primary,
        reference: f.reference.clone(),
        map_to_pk: f.map_to_pk,
        on_update: f.on_update.clone(),
        autoincrement,
    }
}

/// Foreign keys store the plain type behind a serial primary key.
fn referencing_type(pk_type: &str) -> String {
    match pk_type {
        "serial" => "integer".into(),
        "bigserial" => "bigint".into(),
        "smallserial" => "smallint".into(),
        other => other.to_string(),
    }
}

pub(crate) fn is_integer_type(t: &str) -> bool {
    matches!(
        t,
        "int" | "int2" | "int4" | "int8" | "integer" | "smallint" | "bigint" | "tinyint" | "mediumint"
    ) || t.ends_with("serial")
}
