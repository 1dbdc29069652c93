//! PostgreSQL backend on sqlx. Each session borrows pooled connections; writes run in a transaction.

use crate::config::{EntityMeta, FieldMeta, MetadataStorage};
use crate::error::OrmError;
use crate::orm::{Condition, EntityInstance, FindOptions, Orm, Session};
use crate::sql::{self, QueryBuf};
use crate::store::{database_name_from_url, PgOrmConfig};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgDatabaseError, PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::sync::Arc;

pub struct PgOrm {
    pool: PgPool,
    metadata: Arc<MetadataStorage>,
    database: Option<String>,
    schema: String,
}

impl PgOrm {
    pub fn new(pool: PgPool, metadata: MetadataStorage, database: Option<String>, schema: &str) -> Self {
        PgOrm {
            pool,
            metadata: Arc::new(metadata),
            database,
            schema: schema.to_string(),
        }
    }

    pub async fn connect(config: &PgOrmConfig, metadata: MetadataStorage) -> Result<Self, OrmError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(map_sqlx_error)?;
        tracing::info!(schema = %config.schema, entities = metadata.all().len(), "connected to postgres");
        Ok(PgOrm::new(
            pool,
            metadata,
            database_name_from_url(&config.database_url),
            &config.schema,
        ))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }
}

#[async_trait]
impl Orm for PgOrm {
    fn metadata(&self) -> &MetadataStorage {
        &self.metadata
    }

    fn driver_name(&self) -> &'static str {
        "postgresql"
    }

    fn database_name(&self) -> Option<String> {
        self.database.clone()
    }

    async fn fork(&self) -> Result<Box<dyn Session>, OrmError> {
        Ok(Box::new(PgSession {
            pool: self.pool.clone(),
            schema: self.schema.clone(),
        }))
    }
}

pub struct PgSession {
    pool: PgPool,
    schema: String,
}

fn bound(q: &QueryBuf) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    query
}

#[async_trait]
impl Session for PgSession {
    async fn count(&mut self, entity: &EntityMeta, condition: &Condition) -> Result<u64, OrmError> {
        let q = sql::count(entity, &self.schema, condition)?;
        let row = bound(&q).fetch_one(&self.pool).await.map_err(map_sqlx_error)?;
        let n: i64 = row.try_get(0).map_err(map_sqlx_error)?;
        Ok(n.max(0) as u64)
    }

    async fn find(
        &mut self,
        entity: &EntityMeta,
        condition: &Condition,
        options: &FindOptions,
    ) -> Result<Vec<EntityInstance>, OrmError> {
        let q = sql::select(entity, &self.schema, condition, options)?;
        let rows = bound(&q).fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(rows
            .iter()
            .map(|r| EntityInstance::managed(entity, row_to_object(entity, r)))
            .collect())
    }

    async fn native_delete(&mut self, entity: &EntityMeta, pk: &Value) -> Result<u64, OrmError> {
        let q = sql::delete(entity, &self.schema, pk)?;
        let result = bound(&q).execute(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn persist_and_flush(&mut self, entity: &EntityMeta, instance: &mut EntityInstance) -> Result<(), OrmError> {
        let q = if instance.is_managed() {
            let pk = instance
                .identity()
                .ok_or_else(|| OrmError::Other(format!("{} instance has no primary key value", entity.name)))?;
            sql::update(entity, &self.schema, pk, instance.data())?
        } else {
            sql::insert(entity, &self.schema, instance.data())
        };
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let row = bound(&q).fetch_optional(&mut *tx).await.map_err(map_sqlx_error)?;
        let row = row.ok_or_else(|| OrmError::Other(format!("{} row no longer exists", entity.name)))?;
        tx.commit().await.map_err(map_sqlx_error)?;
        instance.hydrate(entity, row_to_object(entity, &row));
        Ok(())
    }
}

/// Maps driver failures to ORM categories. Constraint, data and syntax classes
/// (SQLSTATE 23, 22, 42) are query failures; NOT NULL violations are validation failures.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> OrmError {
    match e {
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            let column = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(PgDatabaseError::column)
                .map(str::to_string);
            let message = db.message().to_string();
            if code == "23502" {
                OrmError::Validation { column, message }
            } else if code.starts_with("23") || code.starts_with("22") || code.starts_with("42") {
                OrmError::Query { column, message }
            } else {
                OrmError::Other(message)
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => OrmError::Connection(e.to_string()),
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) => OrmError::Connection(e.to_string()),
        other => OrmError::Other(other.to_string()),
    }
}

/// Row projection keyed by property name (the select list aliases columns).
fn row_to_object(entity: &EntityMeta, row: &PgRow) -> Map<String, Value> {
    entity
        .column_fields()
        .map(|f| (f.name.clone(), cell_to_value(row, f)))
        .collect()
}

fn cell_to_value(row: &PgRow, field: &FieldMeta) -> Value {
    let name = field.name.as_str();
    if field.is_json() {
        if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
            return j;
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.and_utc().to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
