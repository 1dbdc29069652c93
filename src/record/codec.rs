//! Flat dot-path maps <-> nested JSON objects.
//!
//! Arrays flatten to index segments (`tags.0`); empty objects and arrays stay
//! as leaf values so they survive the round trip.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const DELIMITER: char = '.';

pub fn flatten(nested: &Map<String, Value>) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (k, v) in nested {
        flatten_into(k.clone(), v, &mut out);
    }
    out
}

fn flatten_into(prefix: String, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (k, v) in map {
                flatten_into(format!("{}{}{}", prefix, DELIMITER, k), v, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(format!("{}{}{}", prefix, DELIMITER, i), v, out);
            }
        }
        leaf => {
            out.insert(prefix, leaf.clone());
        }
    }
}

pub fn unflatten(flat: &BTreeMap<String, Value>) -> Map<String, Value> {
    let mut root = Value::Object(Map::new());
    for (path, value) in flat {
        let segments: Vec<&str> = path.split(DELIMITER).collect();
        insert_path(&mut root, &segments, value.clone());
    }
    match root {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn insert_path(node: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };
    if let (Value::Array(items), Ok(index)) = (&mut *node, head.parse::<usize>()) {
        if items.len() <= index {
            items.resize(index + 1, Value::Null);
        }
        insert_path(&mut items[index], rest, value);
        return;
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map
            .entry(head.to_string())
            .or_insert_with(|| empty_container_for(rest));
        if !rest.is_empty() && !child.is_object() && !child.is_array() {
            *child = empty_container_for(rest);
        }
        insert_path(child, rest, value);
    }
}

/// Numeric next segment creates an array, anything else an object.
fn empty_container_for(rest: &[&str]) -> Value {
    match rest.first() {
        Some(seg) if seg.parse::<usize>().is_ok() => Value::Array(Vec::new()),
        Some(_) => Value::Object(Map::new()),
        None => Value::Null,
    }
}

/// Value at a dot path inside a nested object.
pub fn get_path<'a>(nested: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split(DELIMITER);
    let mut current = nested.get(segments.next()?)?;
    for seg in segments {
        current = match current {
            Value::Object(map) => map.get(seg)?,
            Value::Array(items) => items.get(seg.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
