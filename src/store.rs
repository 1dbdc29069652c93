//! Connection settings from env, database bootstrap and table DDL from entity metadata.

use crate::config::{DefaultValue, EntityMeta, FieldMeta, MetadataStorage};
use crate::error::OrmError;
use crate::orm::map_sqlx_error;
use crate::sql::{cast_type, qualified_table, quoted, resolve_schema, sql_expression};
use serde_json::Value;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::collections::HashSet;
use std::str::FromStr;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/admin";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default schema for entity tables. From env `ADMIN_SCHEMA`, default `public`. Must be a valid PostgreSQL identifier.
pub fn admin_schema() -> String {
    std::env::var("ADMIN_SCHEMA").unwrap_or_else(|_| "public".into())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PgOrmConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub schema: String,
}

impl PgOrmConfig {
    /// Reads `DATABASE_URL`, `ADMIN_DB_MAX_CONNECTIONS` and `ADMIN_SCHEMA`.
    pub fn from_env() -> Self {
        let max_connections = std::env::var("ADMIN_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        PgOrmConfig {
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            max_connections,
            schema: admin_schema(),
        }
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), OrmError> {
    let (admin_url, db_name) = split_database_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| OrmError::Connection(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await.map_err(map_sqlx_error)?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await
        .map_err(map_sqlx_error)?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quoted(&db_name)))
            .execute(&mut conn)
            .await
            .map_err(map_sqlx_error)?;
    }
    Ok(())
}

/// Database name from a connection URL, without query string.
pub fn database_name_from_url(url: &str) -> Option<String> {
    split_database_url(url).ok().map(|(_, name)| name).filter(|n| !n.is_empty())
}

fn split_database_url(url: &str) -> Result<(String, String), OrmError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| OrmError::Connection("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_string()))
}

/// Create schemas and entity tables if they do not exist. Referenced tables are
/// created first so foreign keys resolve; reference cycles are created without them.
pub async fn ensure_tables(pool: &PgPool, default_schema: &str, metadata: &MetadataStorage) -> Result<(), OrmError> {
    let schemas: HashSet<&str> = metadata
        .all()
        .iter()
        .map(|e| resolve_schema(e, default_schema))
        .collect();
    for schema in schemas {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)))
            .execute(pool)
            .await
            .map_err(map_sqlx_error)?;
    }
    for ddl in create_table_statements(default_schema, metadata) {
        tracing::debug!(sql = %ddl, "ddl");
        sqlx::query(&ddl).execute(pool).await.map_err(map_sqlx_error)?;
    }
    Ok(())
}

fn create_table_statements(default_schema: &str, metadata: &MetadataStorage) -> Vec<String> {
    let mut pending: Vec<&EntityMeta> = metadata.all().iter().map(|e| e.as_ref()).collect();
    let mut created: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();
    while !pending.is_empty() {
        let ready: Vec<&EntityMeta> = pending
            .iter()
            .copied()
            .filter(|e| references(e).all(|target| target == e.name || created.contains(target)))
            .collect();
        let (batch, with_fks) = if ready.is_empty() {
            (std::mem::take(&mut pending), false)
        } else {
            pending.retain(|e| !ready.iter().any(|r| r.name == e.name));
            (ready, true)
        };
        for entity in batch {
            out.push(create_table(entity, default_schema, metadata, with_fks));
            created.insert(entity.name.as_str());
        }
    }
    out
}

fn references(entity: &EntityMeta) -> impl Iterator<Item = &str> {
    entity
        .column_fields()
        .filter(|f| f.kind.is_relation() && !f.is_json())
        .filter_map(|f| f.reference.as_deref())
}

fn create_table(entity: &EntityMeta, default_schema: &str, metadata: &MetadataStorage, with_fks: bool) -> String {
    let mut defs: Vec<String> = entity
        .column_fields()
        .map(|f| column_definition(f, default_schema, metadata, with_fks))
        .collect();
    if !entity.primary_keys.is_empty() {
        let pks: Vec<String> = entity
            .primary_keys
            .iter()
            .filter_map(|pk| entity.field(pk))
            .map(|f| quoted(&f.column))
            .collect();
        defs.push(format!("PRIMARY KEY ({})", pks.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified_table(resolve_schema(entity, default_schema), &entity.table),
        defs.join(", ")
    )
}

fn column_definition(field: &FieldMeta, default_schema: &str, metadata: &MetadataStorage, with_fks: bool) -> String {
    let typ = if field.autoincrement {
        match cast_type(field).as_str() {
            "bigint" | "int8" => "bigserial".to_string(),
            "smallint" | "int2" => "smallserial".to_string(),
            _ => "serial".to_string(),
        }
    } else {
        cast_type(field)
    };
    let mut def = format!("{} {}", quoted(&field.column), typ);
    if !field.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = field.default.as_ref().and_then(|d| default_literal(field, d)) {
        def.push_str(" DEFAULT ");
        def.push_str(&default);
    }
    if with_fks && field.kind.is_relation() && !field.is_json() {
        let target = field.reference.as_deref().and_then(|t| metadata.find(t));
        if let Some((target, pk)) = target.and_then(|t| t.primary_key().map(|pk| (t, pk))) {
            def.push_str(&format!(
                " REFERENCES {} ({})",
                qualified_table(resolve_schema(target, default_schema), &target.table),
                quoted(&pk.column)
            ));
        }
    }
    def
}

fn default_literal(field: &FieldMeta, default: &DefaultValue) -> Option<String> {
    match default {
        DefaultValue::Expression(expr) => sql_expression(expr).map(str::to_string),
        DefaultValue::Value(v) if field.is_json() => {
            Some(format!("'{}'::jsonb", v.to_string().replace('\'', "''")))
        }
        DefaultValue::Value(Value::Null) => None,
        DefaultValue::Value(Value::String(s)) => Some(format!("'{}'", s.replace('\'', "''"))),
        DefaultValue::Value(Value::Bool(b)) => Some(b.to_string().to_uppercase()),
        DefaultValue::Value(Value::Number(n)) => Some(n.to_string()),
        DefaultValue::Value(other) => Some(format!("'{}'", other.to_string().replace('\'', "''"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, EntitySchema, FieldSchema, ReferenceKind};
    use serde_json::json;

    #[test]
    fn database_name_is_taken_from_the_url_path() {
        assert_eq!(database_name_from_url("postgres://u:p@localhost:5432/cars?sslmode=disable").as_deref(), Some("cars"));
        assert_eq!(database_name_from_url("postgres://localhost/"), None);
        let (admin, name) = split_database_url("postgres://localhost/admin").unwrap();
        assert_eq!(admin, "postgres://localhost/postgres");
        assert_eq!(name, "admin");
    }

    #[test]
    fn tables_are_created_after_the_tables_they_reference() {
        let storage = resolve(&[
            EntitySchema::new("Car")
                .field(FieldSchema::primary("id", "serial"))
                .field(FieldSchema::scalar("name", "text"))
                .field(FieldSchema::scalar("meta", "jsonb").with_default(DefaultValue::Value(json!({}))))
                .field(FieldSchema::relation("owner", ReferenceKind::ManyToOne, "User").nullable()),
            EntitySchema::new("User")
                .field(FieldSchema::primary("id", "serial"))
                .field(FieldSchema::scalar("active", "boolean").with_default(DefaultValue::Value(json!(true)))),
        ])
        .unwrap();
        let ddl = create_table_statements("public", &storage);
        assert_eq!(ddl.len(), 2);
        assert_eq!(
            ddl[0],
            "CREATE TABLE IF NOT EXISTS \"public\".\"user\" (\"id\" serial NOT NULL, \"active\" boolean NOT NULL DEFAULT TRUE, PRIMARY KEY (\"id\"))"
        );
        assert!(ddl[1].contains("\"meta\" jsonb NOT NULL DEFAULT '{}'::jsonb"));
        assert!(ddl[1].contains("\"owner\" integer REFERENCES \"public\".\"user\" (\"id\")"));
    }

    #[test]
    fn reference_cycles_drop_foreign_keys() {
        let storage = resolve(&[
            EntitySchema::new("A")
                .field(FieldSchema::primary("id", "serial"))
                .field(FieldSchema::relation("b", ReferenceKind::ManyToOne, "B").nullable()),
            EntitySchema::new("B")
                .field(FieldSchema::primary("id", "serial"))
                .field(FieldSchema::relation("a", ReferenceKind::ManyToOne, "A").nullable()),
        ])
        .unwrap();
        let ddl = create_table_statements("public", &storage);
        assert_eq!(ddl.len(), 2);
        assert!(ddl.iter().all(|d| !d.contains("REFERENCES")));
    }
}
