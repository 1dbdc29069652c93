use crate::error::ValidationErrors;
use crate::record::{Params, RecordValue};
use serde::Serialize;

/// In-memory record wrapper handed to the admin framework.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BaseRecord {
    #[serde(rename = "resourceId")]
    resource_id: String,
    params: Params,
    errors: ValidationErrors,
    #[serde(skip)]
    id_path: Option<String>,
    #[serde(skip)]
    title_path: Option<String>,
}

impl BaseRecord {
    pub fn new(params: Params, resource_id: impl Into<String>, id_path: Option<String>, title_path: Option<String>) -> Self {
        BaseRecord {
            resource_id: resource_id.into(),
            params,
            errors: ValidationErrors::new(),
            id_path,
            title_path,
        }
    }

    pub fn with_errors(mut self, errors: ValidationErrors) -> Self {
        self.errors = errors;
        self
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn into_params(self) -> Params {
        self.params
    }

    pub fn param(&self, path: &str) -> Option<&RecordValue> {
        self.params.get(path)
    }

    /// Primary-key value as text; `None` for unsaved records.
    pub fn id(&self) -> Option<String> {
        self.id_path
            .as_deref()
            .and_then(|p| self.params.get(p))
            .and_then(RecordValue::to_text)
    }

    /// Display title: the title property when set, else the id.
    pub fn title(&self) -> Option<String> {
        self.title_path
            .as_deref()
            .and_then(|p| self.params.get(p))
            .and_then(RecordValue::to_text)
            .or_else(|| self.id())
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id(),
            "title": self.title(),
            "resourceId": self.resource_id,
            "params": self.params,
            "errors": self.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_and_title_from_params() {
        let mut params = Params::new();
        params.insert("id".into(), RecordValue::from(4_i64));
        params.insert("name".into(), RecordValue::from("Civic"));
        let record = BaseRecord::new(params, "Car", Some("id".into()), Some("name".into()));
        assert_eq!(record.id().as_deref(), Some("4"));
        assert_eq!(record.title().as_deref(), Some("Civic"));
        assert!(record.is_valid());
        assert_eq!(record.to_json()["params"]["name"], "Civic");
    }

    #[test]
    fn title_falls_back_to_id() {
        let mut params = Params::new();
        params.insert("id".into(), RecordValue::from(9_i64));
        let record = BaseRecord::new(params, "Car", Some("id".into()), Some("name".into()));
        assert_eq!(record.title().as_deref(), Some("9"));
    }
}
