//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Key used when a persistence failure cannot be attributed to a column.
pub const GENERIC_ERROR_KEY: &str = "base";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("duplicate field: {entity}.{field}")]
    DuplicateField { entity: String, field: String },
    #[error("unknown reference: {entity}.{field} targets '{target}'")]
    UnknownReference {
        entity: String,
        field: String,
        target: String,
    },
    #[error("relation {entity}.{field} declares no target entity")]
    MissingReference { entity: String, field: String },
    #[error("unknown entity: {0}")]
    UnknownEntity(String),
    #[error("schema load: {0}")]
    Load(String),
}

/// Failure reported by an ORM backend. The variant is its category: the adapter
/// only knows how to attribute `Query` and `Validation` failures to fields.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    #[error("{message}")]
    Query {
        column: Option<String>,
        message: String,
    },
    #[error("{message}")]
    Validation {
        column: Option<String>,
        message: String,
    },
    #[error("connection: {0}")]
    Connection(String),
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    pub fn query(message: impl Into<String>) -> Self {
        OrmError::Query {
            column: None,
            message: message.into(),
        }
    }

    pub fn unknown_property(entity: &str, path: &str) -> Self {
        OrmError::Query {
            column: Some(path.to_string()),
            message: format!("Trying to query by not existing property {}.{}", entity, path),
        }
    }

    /// Error name used as the `type` of a normalized field error.
    pub fn category(&self) -> &'static str {
        match self {
            OrmError::Query { .. } => "QueryFailedError",
            OrmError::Validation { .. } => "ValidationError",
            OrmError::Connection(_) => "ConnectionError",
            OrmError::Other(_) => "DriverError",
        }
    }

    pub fn is_recognized(&self) -> bool {
        matches!(self, OrmError::Query { .. } | OrmError::Validation { .. })
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            OrmError::Query { column, .. } | OrmError::Validation { column, .. } => column.as_deref(),
            _ => None,
        }
    }
}

/// One failing field: the first violated constraint and its message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Field-indexed validation failure, serialized as `{ field: { type, message } }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an error for `field` unless one is already present; the first one wins.
    pub fn add(&mut self, field: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| FieldError {
            kind: kind.into(),
            message: message.into(),
        });
    }

    pub fn get(&self, field: &str) -> Option<&FieldError> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldError)> {
        self.0.iter()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("validation: {0}")]
    Validation(ValidationErrors),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("query: {0}")]
    Query(String),
    #[error("persistence: {0}")]
    Persistence(String),
}

impl From<OrmError> for AdapterError {
    fn from(e: OrmError) -> Self {
        if e.is_recognized() {
            AdapterError::Query(e.to_string())
        } else {
            AdapterError::Persistence(e.to_string())
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AdapterError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AdapterError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AdapterError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AdapterError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AdapterError::Query(_) => (StatusCode::BAD_REQUEST, "query_error"),
            AdapterError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
        }
    }
}

impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let details = match &self {
            AdapterError::Validation(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_per_field_wins() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "minLength", "name is too short");
        errors.add("name", "isIn", "name is reserved");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("name").map(|e| e.kind.as_str()), Some("minLength"));
    }

    #[test]
    fn validation_errors_serialize_as_field_map() {
        let mut errors = ValidationErrors::new();
        errors.add("name", "isNotEmpty", "name should not be empty");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": { "type": "isNotEmpty", "message": "name should not be empty" } })
        );
    }

    #[test]
    fn orm_errors_map_by_category() {
        assert!(matches!(
            AdapterError::from(OrmError::query("bad column")),
            AdapterError::Query(_)
        ));
        assert!(matches!(
            AdapterError::from(OrmError::Connection("refused".into())),
            AdapterError::Persistence(_)
        ));
    }

    #[test]
    fn status_codes() {
        let e = AdapterError::Validation(ValidationErrors::new());
        assert_eq!(e.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
        let e = AdapterError::NotFound("Car 7".into());
        assert_eq!(e.into_response().status(), StatusCode::NOT_FOUND);
        let e = AdapterError::Persistence("boom".into());
        assert_eq!(e.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
