//! Resolved entity metadata: schemas validated and normalized for runtime use.

use crate::config::{DefaultValue, ReferenceKind};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct FieldMeta {
    pub name: String,
    pub column: String,
    pub kind: ReferenceKind,
    /// Lowercased storage type name (e.g. "text", "jsonb", "timestamptz").
    pub column_type: String,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub primary: bool,
    pub reference: Option<String>,
    pub map_to_pk: bool,
    pub on_update: Option<String>,
    /// Integer primary key without a default: storage assigns the next value.
    pub autoincrement: bool,
}

impl FieldMeta {
    pub fn is_json(&self) -> bool {
        matches!(self.column_type.as_str(), "json" | "jsonb")
            || matches!(self.kind, ReferenceKind::ManyToMany | ReferenceKind::Embedded)
    }

    /// Storage fills the value when the field is absent on insert.
    pub fn is_generated(&self) -> bool {
        self.autoincrement || self.default.is_some()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityMeta {
    pub name: String,
    pub class_name: String,
    pub schema: Option<String>,
    pub table: String,
    pub fields: Vec<FieldMeta>,
    pub primary_keys: Vec<String>,
}

impl EntityMeta {
    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn primary_key(&self) -> Option<&FieldMeta> {
        self.primary_keys.first().and_then(|pk| self.field(pk))
    }

    /// Fields stored in this entity's own table, in declaration order.
    pub fn column_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|f| f.kind.has_column())
    }
}

/// Lookup table of registered entities, keyed by entity name and class name.
#[derive(Clone, Debug, Default)]
pub struct MetadataStorage {
    entities: Vec<Arc<EntityMeta>>,
    by_name: HashMap<String, usize>,
}

impl MetadataStorage {
    pub fn new(entities: Vec<EntityMeta>) -> Self {
        let mut by_name = HashMap::new();
        for (i, e) in entities.iter().enumerate() {
            by_name.entry(e.name.clone()).or_insert(i);
            by_name.entry(e.class_name.clone()).or_insert(i);
        }
        MetadataStorage {
            entities: entities.into_iter().map(Arc::new).collect(),
            by_name,
        }
    }

    pub fn find(&self, name: &str) -> Option<&Arc<EntityMeta>> {
        self.by_name.get(name).and_then(|&i| self.entities.get(i))
    }

    pub fn all(&self) -> &[Arc<EntityMeta>] {
        &self.entities
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
