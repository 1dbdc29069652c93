//! Raw entity schema types matching the JSON schema documents.

use serde::{Deserialize, Deserializer, Serialize};

/// How a field relates to storage. Only the first four are exposed as properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceKind {
    Scalar,
    ManyToOne,
    OneToOne,
    ManyToMany,
    OneToMany,
    Embedded,
}

impl Default for ReferenceKind {
    fn default() -> Self {
        ReferenceKind::Scalar
    }
}

impl ReferenceKind {
    pub fn is_relation(self) -> bool {
        matches!(
            self,
            ReferenceKind::ManyToOne
                | ReferenceKind::OneToOne
                | ReferenceKind::ManyToMany
                | ReferenceKind::OneToMany
        )
    }

    /// Kinds that own a column in the entity's table. The inverse side of a
    /// one-to-many lives in the other table.
    pub fn has_column(self) -> bool {
        !matches!(self, ReferenceKind::OneToMany)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum DefaultValue {
    /// A concrete JSON value stored as-is when the field is absent.
    Value(serde_json::Value),
    /// A storage-side expression such as `now()` or `gen_random_uuid()`.
    Expression(String),
}

impl<'de> Deserialize<'de> for DefaultValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        if let serde_json::Value::Object(obj) = &v {
            if obj.len() == 1 {
                match obj.get("expression") {
                    Some(serde_json::Value::String(s)) => return Ok(DefaultValue::Expression(s.clone())),
                    Some(other) => {
                        return Err(serde::de::Error::custom(format!(
                            "default expression must be a string; got {}",
                            type_name_of_json(other)
                        )))
                    }
                    None => {}
                }
                if let Some(value) = obj.get("value") {
                    return Ok(DefaultValue::Value(value.clone()));
                }
            }
        }
        Ok(DefaultValue::Value(v))
    }
}

fn type_name_of_json(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    /// Storage column; defaults to the snake_case form of `name`.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub kind: ReferenceKind,
    #[serde(default)]
    pub column_type: Option<String>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub primary: bool,
    /// Target entity for relation kinds.
    #[serde(default)]
    pub reference: Option<String>,
    /// Relation is carried by its foreign-key scalar rather than a hydrated object.
    #[serde(default = "default_true")]
    pub map_to_pk: bool,
    /// Expression re-applied on every update (e.g. `now()`).
    #[serde(default)]
    pub on_update: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl FieldSchema {
    pub fn scalar(name: &str, column_type: &str) -> Self {
        FieldSchema {
            name: name.to_string(),
            column: None,
            kind: ReferenceKind::Scalar,
            column_type: Some(column_type.to_string()),
            nullable: false,
            default: None,
            primary: false,
            reference: None,
            map_to_pk: true,
            on_update: None,
        }
    }

    pub fn primary(name: &str, column_type: &str) -> Self {
        FieldSchema {
            primary: true,
            ..FieldSchema::scalar(name, column_type)
        }
    }

    pub fn relation(name: &str, kind: ReferenceKind, target: &str) -> Self {
        FieldSchema {
            kind,
            column_type: None,
            reference: Some(target.to_string()),
            ..FieldSchema::scalar(name, "integer")
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_column(mut self, column: &str) -> Self {
        self.column = Some(column.to_string());
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn on_update(mut self, expression: &str) -> Self {
        self.on_update = Some(expression.to_string());
        self
    }
}

impl EntitySchema {
    pub fn new(name: &str) -> Self {
        EntitySchema {
            name: name.to_string(),
            class_name: None,
            table: None,
            schema: None,
            fields: Vec::new(),
        }
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_forms() {
        let d: DefaultValue = serde_json::from_str(r#"{ "expression": "now()" }"#).unwrap();
        assert_eq!(d, DefaultValue::Expression("now()".into()));
        let d: DefaultValue = serde_json::from_str(r#"{ "value": "draft" }"#).unwrap();
        assert_eq!(d, DefaultValue::Value("draft".into()));
        let d: DefaultValue = serde_json::from_str("{}").unwrap();
        assert_eq!(d, DefaultValue::Value(serde_json::json!({})));
        assert!(serde_json::from_str::<DefaultValue>(r#"{ "expression": 1 }"#).is_err());
    }

    #[test]
    fn field_schema_defaults() {
        let f: FieldSchema = serde_json::from_str(r#"{ "name": "owner", "kind": "MANY_TO_ONE", "reference": "User" }"#).unwrap();
        assert_eq!(f.kind, ReferenceKind::ManyToOne);
        assert!(f.map_to_pk);
        assert!(!f.nullable);
        assert!(f.column.is_none());
    }
}
