//! In-process ORM backend. Each entity is a table of JSON rows in insertion order.

use crate::config::{DefaultValue, EntityMeta, FieldMeta, MetadataStorage};
use crate::error::OrmError;
use crate::orm::{Condition, Direction, EntityInstance, FindOptions, Orm, Session};
use crate::record::get_path;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Table {
    rows: Vec<Map<String, Value>>,
    next_id: i64,
}

#[derive(Default)]
struct Store {
    tables: Mutex<HashMap<String, Table>>,
    statements: AtomicU64,
}

#[derive(Clone)]
pub struct MemoryOrm {
    metadata: Arc<MetadataStorage>,
    store: Arc<Store>,
    database: String,
}

impl MemoryOrm {
    pub fn new(metadata: MetadataStorage) -> Self {
        MemoryOrm {
            metadata: Arc::new(metadata),
            store: Arc::new(Store::default()),
            database: "memory".into(),
        }
    }

    pub fn with_database_name(mut self, name: &str) -> Self {
        self.database = name.to_string();
        self
    }

    /// Number of statements executed against storage so far.
    pub fn statement_count(&self) -> u64 {
        self.store.statements.load(AtomicOrdering::SeqCst)
    }

    /// Stored rows of an entity, keyed by property name.
    pub fn rows(&self, entity: &str) -> Vec<Map<String, Value>> {
        let tables = lock(&self.store.tables);
        tables.get(entity).map(|t| t.rows.clone()).unwrap_or_default()
    }
}

fn lock(tables: &Mutex<HashMap<String, Table>>) -> std::sync::MutexGuard<'_, HashMap<String, Table>> {
    // A panic while holding the lock leaves rows consistent: every write is a single push or slot replace.
    tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Orm for MemoryOrm {
    fn metadata(&self) -> &MetadataStorage {
        &self.metadata
    }

    fn driver_name(&self) -> &'static str {
        "memory"
    }

    fn database_name(&self) -> Option<String> {
        Some(self.database.clone())
    }

    async fn fork(&self) -> Result<Box<dyn Session>, OrmError> {
        Ok(Box::new(MemorySession {
            store: Arc::clone(&self.store),
        }))
    }
}

pub struct MemorySession {
    store: Arc<Store>,
}

impl MemorySession {
    fn statement(&self) {
        self.store.statements.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn count(&mut self, entity: &EntityMeta, condition: &Condition) -> Result<u64, OrmError> {
        check_paths(entity, condition.paths())?;
        self.statement();
        let tables = lock(&self.store.tables);
        let count = tables
            .get(&entity.name)
            .map(|t| t.rows.iter().filter(|r| matches(r, condition)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn find(
        &mut self,
        entity: &EntityMeta,
        condition: &Condition,
        options: &FindOptions,
    ) -> Result<Vec<EntityInstance>, OrmError> {
        check_paths(entity, condition.paths())?;
        if let Some(order) = &options.order_by {
            check_paths(entity, vec![order.path.as_str()])?;
        }
        self.statement();
        let tables = lock(&self.store.tables);
        let mut rows: Vec<&Map<String, Value>> = tables
            .get(&entity.name)
            .map(|t| t.rows.iter().filter(|r| matches(r, condition)).collect())
            .unwrap_or_default();
        if let Some(order) = &options.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_opt(get_path(a, &order.path), get_path(b, &order.path));
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
        let offset = options.offset.unwrap_or(0) as usize;
        let limit = options.limit.map(|n| n as usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| EntityInstance::managed(entity, r.clone()))
            .collect())
    }

    async fn native_delete(&mut self, entity: &EntityMeta, pk: &Value) -> Result<u64, OrmError> {
        let Some(pk_field) = entity.primary_key() else {
            return Ok(0);
        };
        self.statement();
        let mut tables = lock(&self.store.tables);
        let Some(table) = tables.get_mut(&entity.name) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table
            .rows
            .retain(|r| !r.get(&pk_field.name).map(|v| json_eq(v, pk)).unwrap_or(false));
        Ok((before - table.rows.len()) as u64)
    }

    async fn persist_and_flush(&mut self, entity: &EntityMeta, instance: &mut EntityInstance) -> Result<(), OrmError> {
        self.statement();
        let mut tables = lock(&self.store.tables);
        let table = tables.entry(entity.name.clone()).or_default();
        let stored = if instance.is_managed() {
            update_row(entity, table, instance)?
        } else {
            insert_row(entity, table, instance)?
        };
        instance.hydrate(entity, stored);
        Ok(())
    }
}

fn insert_row(entity: &EntityMeta, table: &mut Table, instance: &EntityInstance) -> Result<Map<String, Value>, OrmError> {
    let mut row = Map::new();
    for field in entity.column_fields() {
        let value = match instance.data().get(&field.name) {
            Some(v) if !v.is_null() => v.clone(),
            _ if field.autoincrement => {
                // taken even if the insert fails below, like a Postgres sequence
                table.next_id += 1;
                Value::Number(table.next_id.into())
            }
            _ => match &field.default {
                Some(d) => default_value(d),
                None => Value::Null,
            },
        };
        row.insert(field.name.clone(), value);
    }
    check_not_null(entity, &row)?;
    if let Some(pk) = entity.primary_key() {
        let pk_value = row.get(&pk.name).cloned().unwrap_or(Value::Null);
        if let Some(n) = pk_value.as_i64() {
            table.next_id = table.next_id.max(n);
        }
        if table.rows.iter().any(|r| r.get(&pk.name).map(|v| json_eq(v, &pk_value)).unwrap_or(false)) {
            return Err(OrmError::Query {
                column: Some(pk.column.clone()),
                message: format!("duplicate key value violates unique constraint on {}.{}", entity.name, pk.name),
            });
        }
    }
    table.rows.push(row.clone());
    Ok(row)
}

fn update_row(entity: &EntityMeta, table: &mut Table, instance: &EntityInstance) -> Result<Map<String, Value>, OrmError> {
    let pk_field = entity
        .primary_key()
        .ok_or_else(|| OrmError::Other(format!("{} has no primary key; cannot update", entity.name)))?;
    let pk = instance
        .identity()
        .ok_or_else(|| OrmError::Other(format!("{} instance has no primary key value", entity.name)))?;
    let slot = table
        .rows
        .iter_mut()
        .find(|r| r.get(&pk_field.name).map(|v| json_eq(v, pk)).unwrap_or(false))
        .ok_or_else(|| OrmError::Other(format!("{} {} no longer exists", entity.name, pk)))?;
    let mut row = slot.clone();
    for field in entity.column_fields() {
        if field.primary {
            continue;
        }
        if let Some(expr) = &field.on_update {
            row.insert(field.name.clone(), expression_value(expr));
        } else if let Some(v) = instance.data().get(&field.name) {
            row.insert(field.name.clone(), v.clone());
        }
    }
    check_not_null(entity, &row)?;
    *slot = row.clone();
    Ok(row)
}

fn check_not_null(entity: &EntityMeta, row: &Map<String, Value>) -> Result<(), OrmError> {
    for field in entity.column_fields() {
        if field.nullable {
            continue;
        }
        if row.get(&field.name).map(Value::is_null).unwrap_or(true) {
            return Err(OrmError::Validation {
                column: Some(field.column.clone()),
                message: format!("Value for {}.{} is required, 'undefined' found", entity.name, field.name),
            });
        }
    }
    Ok(())
}

fn default_value(d: &DefaultValue) -> Value {
    match d {
        DefaultValue::Value(v) => v.clone(),
        DefaultValue::Expression(expr) => expression_value(expr),
    }
}

fn expression_value(expr: &str) -> Value {
    match expr.trim().to_lowercase().as_str() {
        "now()" | "current_timestamp" => Value::String(Utc::now().to_rfc3339()),
        "gen_random_uuid()" | "uuid_generate_v4()" => Value::String(uuid::Uuid::new_v4().to_string()),
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => other
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| Value::String(expr.to_string())),
    }
}

/// Rejects paths whose first segment is not a declared field, the way an ORM
/// rejects queries on unknown properties.
fn check_paths(entity: &EntityMeta, paths: Vec<&str>) -> Result<(), OrmError> {
    for path in paths {
        let head = path.split('.').next().unwrap_or(path);
        let known = entity.field(head).map(FieldMeta::is_json).unwrap_or(false) || entity.field(path).is_some();
        if !known {
            return Err(OrmError::unknown_property(&entity.name, path));
        }
    }
    Ok(())
}

fn matches(row: &Map<String, Value>, condition: &Condition) -> bool {
    match condition {
        Condition::All => true,
        Condition::And(parts) => parts.iter().all(|c| matches(row, c)),
        Condition::Eq(path, v) => match get_path(row, path) {
            Some(found) => json_eq(found, v),
            None => v.is_null(),
        },
        Condition::In(path, values) => get_path(row, path)
            .map(|found| values.iter().any(|v| json_eq(found, v)))
            .unwrap_or(false),
        Condition::Gte(path, v) => get_path(row, path)
            .filter(|found| !found.is_null())
            .map(|found| compare(found, v) != Ordering::Less)
            .unwrap_or(false),
        Condition::Lte(path, v) => get_path(row, path)
            .filter(|found| !found.is_null())
            .map(|found| compare(found, v) != Ordering::Greater)
            .unwrap_or(false),
        Condition::Contains(path, needle) => get_path(row, path)
            .and_then(text_of)
            .map(|text| text.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
        Condition::IsNull(path) => get_path(row, path).map(Value::is_null).unwrap_or(true),
    }
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.parse::<f64>().ok() == n.as_f64()
        }
        (Value::String(x), Value::String(y)) => x == y || datetime_eq(x, y),
        _ => a == b,
    }
}

fn datetime_eq(a: &str, b: &str) -> bool {
    match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// Nulls sort first.
fn compare_opt(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a.filter(|v| !v.is_null()), b.filter(|v| !v.is_null())) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y),
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) => {
            match (DateTime::parse_from_rfc3339(x), DateTime::parse_from_rfc3339(y)) {
                (Ok(dx), Ok(dy)) => dx.cmp(&dy),
                _ => x.cmp(y),
            }
        }
        _ => text_of(a).cmp(&text_of(b)),
    }
}
