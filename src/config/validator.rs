//! Schema validation: unique names and resolvable relations.

use crate::config::EntitySchema;
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(schemas: &[EntitySchema]) -> Result<(), ConfigError> {
    let mut entity_names = HashSet::new();
    for e in schemas {
        if !entity_names.insert(e.name.as_str()) {
            return Err(ConfigError::DuplicateEntity(e.name.clone()));
        }
    }

    for e in schemas {
        let mut field_names = HashSet::new();
        for f in &e.fields {
            if !field_names.insert(f.name.as_str()) {
                return Err(ConfigError::DuplicateField {
                    entity: e.name.clone(),
                    field: f.name.clone(),
                });
            }
            if !f.kind.is_relation() {
                continue;
            }
            let target = f.reference.as_deref().ok_or_else(|| ConfigError::MissingReference {
                entity: e.name.clone(),
                field: f.name.clone(),
            })?;
            if !entity_names.contains(target) {
                return Err(ConfigError::UnknownReference {
                    entity: e.name.clone(),
                    field: f.name.clone(),
                    target: target.to_string(),
                });
            }
        }
    }

    Ok(())
}
