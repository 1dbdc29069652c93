//! Generic filters as sent by the admin framework, and their translation into ORM conditions.

use crate::orm::Condition;
use crate::property::{Properties, PropertyType};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Query-string prefix of filter keys (`filters.name=Civic`).
pub const FILTER_PREFIX: &str = "filters.";
/// Range bound suffixes (`filters.createdAt~~from=...`).
pub const FROM_SUFFIX: &str = "~~from";
pub const TO_SUFFIX: &str = "~~to";

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Single(String),
    /// Any of the values.
    Many(Vec<String>),
    /// Inclusive bounds; either may be open.
    Range { from: Option<String>, to: Option<String> },
}

/// Path -> criterion. Paths are kept exactly as given.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    elements: BTreeMap<String, FilterValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, value: FilterValue) -> Self {
        self.elements.insert(path.to_string(), value);
        self
    }

    /// Builds a filter from query pairs. Only `filters.*` keys are read; a path seen
    /// more than once becomes a membership criterion.
    pub fn from_query<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut filter = Filter::new();
        for (key, value) in pairs {
            let Some(path) = key.as_ref().strip_prefix(FILTER_PREFIX) else {
                continue;
            };
            let value: String = value.into();
            if value.is_empty() {
                continue;
            }
            if let Some(path) = path.strip_suffix(FROM_SUFFIX) {
                filter.set_bound(path, Some(value), None);
            } else if let Some(path) = path.strip_suffix(TO_SUFFIX) {
                filter.set_bound(path, None, Some(value));
            } else {
                filter.push_value(path, value);
            }
        }
        filter
    }

    /// Builds a filter from a JSON object: `{ path: "v" | ["a", "b"] | { "from": .., "to": .. } }`.
    pub fn from_json(object: &Map<String, Value>) -> Self {
        let mut filter = Filter::new();
        for (path, v) in object {
            let value = match v {
                Value::Array(items) => FilterValue::Many(items.iter().filter_map(text).collect()),
                Value::Object(bounds) => FilterValue::Range {
                    from: bounds.get("from").and_then(text),
                    to: bounds.get("to").and_then(text),
                },
                other => match text(other) {
                    Some(s) => FilterValue::Single(s),
                    None => continue,
                },
            };
            filter.elements.insert(path.clone(), value);
        }
        filter
    }

    fn set_bound(&mut self, path: &str, from: Option<String>, to: Option<String>) {
        let entry = self
            .elements
            .entry(path.to_string())
            .or_insert(FilterValue::Range { from: None, to: None });
        match entry {
            FilterValue::Range { from: f, to: t } => {
                if from.is_some() {
                    *f = from;
                }
                if to.is_some() {
                    *t = to;
                }
            }
            other => *other = FilterValue::Range { from, to },
        }
    }

    fn push_value(&mut self, path: &str, value: String) {
        match self.elements.get_mut(path) {
            Some(FilterValue::Single(first)) => {
                let first = std::mem::take(first);
                self.elements.insert(path.to_string(), FilterValue::Many(vec![first, value]));
            }
            Some(FilterValue::Many(values)) => values.push(value),
            _ => {
                self.elements.insert(path.to_string(), FilterValue::Single(value));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&FilterValue> {
        self.elements.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.elements.iter()
    }

    /// Native condition for the ORM. An empty filter matches everything.
    pub fn translate(&self, properties: &Properties) -> Condition {
        Condition::and(
            self.elements
                .iter()
                .filter_map(|(path, value)| {
                    let kind = properties.get(path).map(|p| p.r#type());
                    element_condition(path, value, kind)
                })
                .collect(),
        )
    }
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn element_condition(path: &str, value: &FilterValue, kind: Option<PropertyType>) -> Option<Condition> {
    let path = path.to_string();
    match value {
        FilterValue::Single(s) => Some(match kind {
            Some(PropertyType::String) => Condition::Contains(path, s.clone()),
            _ => match typed(s, kind) {
                Some(v) => Condition::Eq(path, v),
                // unparsable for the property type: nothing can match
                None => Condition::In(path, Vec::new()),
            },
        }),
        FilterValue::Many(values) => Some(Condition::In(
            path,
            values.iter().filter_map(|s| typed(s, kind)).collect(),
        )),
        FilterValue::Range { from, to } => {
            let mut bounds = Vec::new();
            for (bound, lower) in [(from, true), (to, false)] {
                let Some(s) = bound.as_deref() else { continue };
                let Some(v) = typed(s, kind) else {
                    return Some(Condition::In(path, Vec::new()));
                };
                bounds.push(if lower {
                    Condition::Gte(path.clone(), v)
                } else {
                    Condition::Lte(path.clone(), v)
                });
            }
            (!bounds.is_empty()).then(|| Condition::and(bounds))
        }
    }
}

/// Parses a filter string into the value type of the property. Paths without a
/// property pass through as strings.
fn typed(s: &str, kind: Option<PropertyType>) -> Option<Value> {
    match kind {
        Some(PropertyType::Number) => s.trim().parse::<i64>().ok().map(Value::from),
        Some(PropertyType::Float) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        Some(PropertyType::Boolean) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        Some(PropertyType::Uuid) => uuid::Uuid::parse_str(s.trim()).ok().map(|u| Value::String(u.to_string())),
        Some(PropertyType::Reference) => Some(match s.trim().parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::String(s.to_string()),
        }),
        _ => Some(Value::String(s.to_string())),
    }
}
