//! Builds parameterized COUNT, SELECT, INSERT, UPDATE, DELETE from entity metadata.

use crate::config::{EntityMeta, FieldMeta};
use crate::error::OrmError;
use crate::orm::{Condition, Direction, FindOptions};
use crate::sql::PgBindValue;
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// Entity's own schema if declared, else the connection default.
pub fn resolve_schema<'a>(entity: &'a EntityMeta, default_schema: &'a str) -> &'a str {
    entity.schema.as_deref().unwrap_or(default_schema)
}

/// Type name usable in a `::type` cast or a column definition. Serial pseudo-types
/// map to their integer type; anything outside identifier characters is dropped.
pub fn cast_type(field: &FieldMeta) -> String {
    let t = field.column_type.trim();
    let t = match t {
        "serial" | "serial4" => "integer",
        "bigserial" | "serial8" => "bigint",
        "smallserial" | "serial2" => "smallint",
        other => other,
    };
    let clean: String = t
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ',' | '[' | ']' | '.'))
        .collect();
    if clean.is_empty() {
        "text".into()
    } else {
        clean
    }
}

/// SQL expression from config (defaults, on-update), accepted only when it is a
/// plain function call or keyword such as `now()`.
pub fn sql_expression(expr: &str) -> Option<&str> {
    let e = expr.trim();
    let safe = !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '(' | ')' | ' '));
    safe.then_some(e)
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Placeholder with the column cast, or a text placeholder for json sub-paths.
    fn placeholder(&mut self, target: &Target<'_>, v: &Value) -> String {
        match target.field {
            Some(f) => {
                let n = self.push_param(PgBindValue::for_field(Some(f), v));
                format!("${}::{}", n, cast_type(f))
            }
            None => {
                let n = self.push_param(json_text(v));
                format!("${}::text", n)
            }
        }
    }
}

/// Where a property path lands in SQL: a whole column, or text extracted from a json column.
struct Target<'a> {
    expr: String,
    field: Option<&'a FieldMeta>,
}

fn target<'a>(entity: &'a EntityMeta, path: &str) -> Result<Target<'a>, OrmError> {
    if let Some(field) = entity.field(path).filter(|f| f.kind.has_column()) {
        return Ok(Target {
            expr: quoted(&field.column),
            field: Some(field),
        });
    }
    let mut segments = path.split('.');
    let head = segments.next().unwrap_or(path);
    let rest: Vec<&str> = segments.collect();
    match entity.field(head).filter(|f| f.is_json()) {
        Some(field) if !rest.is_empty() && rest.iter().all(|s| is_path_segment(s)) => Ok(Target {
            expr: format!("{} #>> '{{{}}}'", quoted(&field.column), rest.join(",")),
            field: None,
        }),
        _ => Err(OrmError::unknown_property(&entity.name, path)),
    }
}

fn is_path_segment(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn json_text(v: &Value) -> PgBindValue {
    match v {
        Value::Null => PgBindValue::Null,
        Value::String(s) => PgBindValue::String(s.clone()),
        other => PgBindValue::String(other.to_string()),
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn condition_sql(q: &mut QueryBuf, entity: &EntityMeta, condition: &Condition) -> Result<String, OrmError> {
    Ok(match condition {
        Condition::All => "TRUE".into(),
        Condition::And(parts) => {
            let parts = parts
                .iter()
                .map(|c| condition_sql(q, entity, c))
                .collect::<Result<Vec<_>, _>>()?;
            format!("({})", parts.join(" AND "))
        }
        Condition::Eq(path, v) => {
            let t = target(entity, path)?;
            if v.is_null() {
                format!("{} IS NULL", t.expr)
            } else {
                let ph = q.placeholder(&t, v);
                format!("{} = {}", t.expr, ph)
            }
        }
        Condition::In(path, values) => {
            let t = target(entity, path)?;
            if values.is_empty() {
                "FALSE".into()
            } else {
                let phs: Vec<String> = values.iter().map(|v| q.placeholder(&t, v)).collect();
                format!("{} IN ({})", t.expr, phs.join(", "))
            }
        }
        Condition::Gte(path, v) => {
            let t = target(entity, path)?;
            let ph = q.placeholder(&t, v);
            format!("{} >= {}", t.expr, ph)
        }
        Condition::Lte(path, v) => {
            let t = target(entity, path)?;
            let ph = q.placeholder(&t, v);
            format!("{} <= {}", t.expr, ph)
        }
        Condition::Contains(path, needle) => {
            let t = target(entity, path)?;
            let n = q.push_param(PgBindValue::String(format!("%{}%", escape_like(needle))));
            format!("CAST({} AS TEXT) ILIKE ${}", t.expr, n)
        }
        Condition::IsNull(path) => format!("{} IS NULL", target(entity, path)?.expr),
    })
}

fn where_clause(q: &mut QueryBuf, entity: &EntityMeta, condition: &Condition) -> Result<String, OrmError> {
    if *condition == Condition::All {
        return Ok(String::new());
    }
    Ok(format!(" WHERE {}", condition_sql(q, entity, condition)?))
}

/// SELECT list keyed by property name. Numeric and custom enum (schema.typename)
/// columns come back as text so every cell decodes.
fn select_column_list(entity: &EntityMeta) -> String {
    entity
        .column_fields()
        .map(|f| {
            let col = quoted(&f.column);
            let expr = if f.column_type.contains('.') || f.column_type.starts_with("numeric") || f.column_type.starts_with("decimal") {
                format!("{}::text", col)
            } else {
                col
            };
            format!("{} AS {}", expr, quoted(&f.name))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn primary_key(entity: &EntityMeta) -> Result<&FieldMeta, OrmError> {
    entity
        .primary_key()
        .ok_or_else(|| OrmError::Other(format!("{} has no primary key", entity.name)))
}

pub fn count(entity: &EntityMeta, schema: &str, condition: &Condition) -> Result<QueryBuf, OrmError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(resolve_schema(entity, schema), &entity.table);
    let where_clause = where_clause(&mut q, entity, condition)?;
    q.sql = format!("SELECT COUNT(*) FROM {}{}", table, where_clause);
    Ok(q)
}

/// SELECT with condition, single-column ORDER BY (primary key when none given), LIMIT/OFFSET.
pub fn select(entity: &EntityMeta, schema: &str, condition: &Condition, options: &FindOptions) -> Result<QueryBuf, OrmError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(resolve_schema(entity, schema), &entity.table);
    let where_clause = where_clause(&mut q, entity, condition)?;
    let order_clause = match &options.order_by {
        Some(order) => {
            let t = target(entity, &order.path)?;
            let dir = match order.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            format!(" ORDER BY {} {}", t.expr, dir)
        }
        None => entity
            .primary_key()
            .map(|pk| format!(" ORDER BY {}", quoted(&pk.column)))
            .unwrap_or_default(),
    };
    let limit_clause = options.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = options.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(entity),
        table,
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    Ok(q)
}

/// INSERT: one placeholder per stored field. Generated fields absent from `data`
/// are omitted so the database fills them.
pub fn insert(entity: &EntityMeta, schema: &str, data: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(resolve_schema(entity, schema), &entity.table);
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for f in entity.column_fields() {
        let val = data.get(&f.name).filter(|v| !v.is_null());
        if val.is_none() && f.is_generated() {
            continue;
        }
        let val = val.cloned().unwrap_or(Value::Null);
        let param_num = q.push_param(PgBindValue::for_field(Some(f), &val));
        cols.push(quoted(&f.column));
        placeholders.push(format!("${}::{}", param_num, cast_type(f)));
    }
    let returning = select_column_list(entity);
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning
        )
    };
    q
}

/// UPDATE by primary key: SET every stored field present in `data`, plus on-update expressions.
pub fn update(entity: &EntityMeta, schema: &str, pk: &Value, data: &Map<String, Value>) -> Result<QueryBuf, OrmError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(resolve_schema(entity, schema), &entity.table);
    let pk_field = primary_key(entity)?;
    let mut sets = Vec::new();
    for f in entity.column_fields() {
        if f.primary {
            continue;
        }
        if let Some(expr) = f.on_update.as_deref().and_then(sql_expression) {
            sets.push(format!("{} = {}", quoted(&f.column), expr));
            continue;
        }
        let Some(v) = data.get(&f.name) else { continue };
        let param_num = q.push_param(PgBindValue::for_field(Some(f), v));
        sets.push(format!("{} = ${}::{}", quoted(&f.column), param_num, cast_type(f)));
    }
    let returning = select_column_list(entity);
    let id_param = q.push_param(PgBindValue::for_field(Some(pk_field), pk));
    let pk_clause = format!("{} = ${}::{}", quoted(&pk_field.column), id_param, cast_type(pk_field));
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {}", returning, table, pk_clause)
    } else {
        format!("UPDATE {} SET {} WHERE {} RETURNING {}", table, sets.join(", "), pk_clause, returning)
    };
    Ok(q)
}

/// DELETE by primary key.
pub fn delete(entity: &EntityMeta, schema: &str, pk: &Value) -> Result<QueryBuf, OrmError> {
    let mut q = QueryBuf::new();
    let table = qualified_table(resolve_schema(entity, schema), &entity.table);
    let pk_field = primary_key(entity)?;
    let n = q.push_param(PgBindValue::for_field(Some(pk_field), pk));
    q.sql = format!("DELETE FROM {} WHERE {} = ${}::{}", table, quoted(&pk_field.column), n, cast_type(pk_field));
    Ok(q)
}
