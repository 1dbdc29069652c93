//! Generic records: flat dot-path params with typed values.

mod base;
pub mod codec;
mod value;

pub use base::BaseRecord;
pub use codec::{flatten, get_path, unflatten};
pub use value::{RecordValue, ReferenceId};

use crate::property::{Properties, PropertyType};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Flat record: dot path -> value.
pub type Params = BTreeMap<String, RecordValue>;

/// Flattens an ORM object projection, typing values by the property at each path.
pub fn flatten_params(nested: &Map<String, Value>, properties: &Properties) -> Params {
    flatten(nested)
        .into_iter()
        .map(|(path, v)| {
            let typed = typed_value(&path, v, properties);
            (path, typed)
        })
        .collect()
}

/// Nested object shape for the ORM's create/assign API.
pub fn unflatten_params(params: &Params) -> Map<String, Value> {
    let flat: BTreeMap<String, Value> = params.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
    unflatten(&flat)
}

/// Re-types an untyped flat record (e.g. one built from framework input) by property.
pub fn typed_params(params: Params, properties: &Properties) -> Params {
    params
        .into_iter()
        .map(|(path, v)| match v {
            RecordValue::String(_) | RecordValue::Number(_) => {
                let typed = typed_value(&path, v.to_json(), properties);
                (path, typed)
            }
            other => (path, other),
        })
        .collect()
}

fn typed_value(path: &str, v: Value, properties: &Properties) -> RecordValue {
    let Some(property) = properties.get(path).or_else(|| array_element_property(path, properties)) else {
        return RecordValue::from_json(v);
    };
    match (property.r#type(), &v) {
        (PropertyType::Datetime, Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
            Ok(d) => RecordValue::DateTime(d.with_timezone(&Utc)),
            Err(_) => RecordValue::from_json(v),
        },
        (PropertyType::Reference, Value::Number(_) | Value::String(_)) => ReferenceId::from_json(&v)
            .map(RecordValue::Reference)
            .unwrap_or_else(|| RecordValue::from_json(v)),
        _ => RecordValue::from_json(v),
    }
}

/// `tags.3` on a many-to-many property `tags` types like the property itself.
fn array_element_property<'a>(path: &str, properties: &'a Properties) -> Option<&'a crate::property::Property> {
    let (parent, index) = path.rsplit_once(codec::DELIMITER)?;
    index.parse::<usize>().ok()?;
    properties.get(parent).filter(|p| p.is_array())
}
