//! Framework-neutral field descriptors built from entity metadata.

use crate::config::{is_integer_type, EntityMeta, FieldMeta, ReferenceKind};
use serde::Serialize;
use std::collections::HashMap;

/// Generic property type understood by the admin framework.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Float,
    Boolean,
    Date,
    Datetime,
    Uuid,
    Mixed,
    Reference,
}

impl PropertyType {
    /// Maps a storage column type name; unknown types fall back to `String`.
    pub fn from_column_type(column_type: &str) -> Self {
        let t = column_type.trim().to_lowercase();
        let base = t.split('(').next().unwrap_or("").trim();
        if base.starts_with("bool") {
            PropertyType::Boolean
        } else if is_integer_type(base) {
            PropertyType::Number
        } else if base.starts_with("float")
            || base.starts_with("double")
            || base == "real"
            || base == "numeric"
            || base == "decimal"
        {
            PropertyType::Float
        } else if base.starts_with("timestamp") || base == "datetime" {
            PropertyType::Datetime
        } else if base == "date" {
            PropertyType::Date
        } else if base == "uuid" {
            PropertyType::Uuid
        } else if base == "json" || base == "jsonb" {
            PropertyType::Mixed
        } else {
            PropertyType::String
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    path: String,
    position: usize,
    #[serde(rename = "type")]
    property_type: PropertyType,
    is_required: bool,
    is_id: bool,
    #[serde(skip)]
    kind: ReferenceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
    #[serde(skip)]
    column: String,
}

impl Property {
    pub fn from_field(field: &FieldMeta, position: usize) -> Self {
        let property_type = if field.kind.is_relation() {
            PropertyType::Reference
        } else {
            PropertyType::from_column_type(&field.column_type)
        };
        Property {
            path: field.name.clone(),
            position,
            property_type,
            is_required: !field.nullable && !field.is_generated() && !field.primary,
            is_id: field.primary,
            kind: field.kind,
            reference: field.reference.clone(),
            column: field.column.clone(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last segment of the path.
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn r#type(&self) -> PropertyType {
        self.property_type
    }

    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    pub fn is_required(&self) -> bool {
        self.is_required
    }

    pub fn is_id(&self) -> bool {
        self.is_id
    }

    pub fn is_editable(&self) -> bool {
        !self.is_id
    }

    pub fn is_sortable(&self) -> bool {
        !matches!(self.property_type, PropertyType::Mixed) && !self.is_array()
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ReferenceKind::ManyToMany)
    }

    /// Target entity name for relation properties.
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn column(&self) -> &str {
        &self.column
    }
}

/// Exposed kinds; collections and embedded values are never properties.
fn is_exposed(kind: ReferenceKind) -> bool {
    matches!(
        kind,
        ReferenceKind::Scalar | ReferenceKind::ManyToOne | ReferenceKind::OneToOne | ReferenceKind::ManyToMany
    )
}

/// Immutable descriptor set for one entity, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Properties {
    list: Vec<Property>,
    by_path: HashMap<String, usize>,
}

impl Properties {
    /// Absent metadata yields an empty set.
    pub fn build(meta: Option<&EntityMeta>) -> Self {
        let mut out = Properties::default();
        let Some(meta) = meta else { return out };
        for (index, field) in meta.fields.iter().enumerate() {
            if !is_exposed(field.kind) {
                continue;
            }
            let property = Property::from_field(field, index);
            if out.by_path.contains_key(property.path()) {
                tracing::warn!(entity = %meta.name, path = %property.path(), "duplicate property path, keeping the first");
                continue;
            }
            out.by_path.insert(property.path().to_string(), out.list.len());
            out.list.push(property);
        }
        out
    }

    pub fn get(&self, path: &str) -> Option<&Property> {
        self.by_path.get(path).and_then(|&i| self.list.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.list.iter()
    }

    pub fn as_slice(&self) -> &[Property] {
        &self.list
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn id_property(&self) -> Option<&Property> {
        self.list.iter().find(|p| p.is_id())
    }

    /// Property used as a record's display title: `name`/`title` if present,
    /// else the first string property.
    pub fn title_property(&self) -> Option<&Property> {
        ["name", "title"]
            .iter()
            .find_map(|p| self.get(p).filter(|p| p.r#type() == PropertyType::String))
            .or_else(|| {
                self.list
                    .iter()
                    .find(|p| p.r#type() == PropertyType::String && !p.is_id())
            })
    }
}
