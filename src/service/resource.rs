//! Resource adapter: one ORM entity behind the admin framework's resource contract.

use crate::config::{is_integer_type, EntityMeta};
use crate::error::{AdapterError, ConfigError, OrmError, ValidationErrors, GENERIC_ERROR_KEY};
use crate::filter::Filter;
use crate::orm::{Condition, Direction, EntityInstance, FindOptions, Orm, OrderBy, Session};
use crate::property::{Properties, Property};
use crate::record::{flatten_params, typed_params, unflatten_params, BaseRecord, Params, RecordValue, ReferenceId};
use crate::service::validation::{first_constraints, Validate};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const DEFAULT_LIMIT: u64 = 10;
pub const DEFAULT_OFFSET: u64 = 0;
/// Database name reported when the ORM has none configured.
pub const DEFAULT_DATABASE_NAME: &str = "orm";

/// Normalized persistence failures carry this type regardless of the driver category.
const PERSISTENCE_ERROR_TYPE: &str = "QueryFailedError";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub sort_by: String,
    pub direction: Direction,
}

/// Paging and ordering for [`Resource::find`]. Unset limit and offset take the defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub sort: Option<Sort>,
}

impl FindParams {
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn sort(mut self, sort_by: &str, direction: Direction) -> Self {
        self.sort = Some(Sort {
            sort_by: sort_by.to_string(),
            direction,
        });
        self
    }
}

#[derive(Clone)]
pub struct Resource {
    orm: Arc<dyn Orm>,
    model: String,
    metadata: Option<Arc<EntityMeta>>,
    properties: Properties,
    validator: Option<Arc<dyn Validate>>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("model", &self.model)
            .field("driver", &self.orm.driver_name())
            .field("properties", &self.properties.len())
            .field("validated", &self.validator.is_some())
            .finish()
    }
}

impl Resource {
    /// Reads the model's metadata once. An unknown model still builds: it has no
    /// properties and an empty name.
    pub fn new(orm: Arc<dyn Orm>, model: &str) -> Self {
        let metadata = orm.metadata().find(model).cloned();
        if metadata.is_none() {
            tracing::warn!(model = %model, "no metadata registered for model");
        }
        let properties = Properties::build(metadata.as_deref());
        Resource {
            orm,
            model: model.to_string(),
            metadata,
            properties,
            validator: None,
        }
    }

    /// Hook called before every create and update.
    pub fn with_validator(mut self, validator: Arc<dyn Validate>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn database_name(&self) -> String {
        self.orm
            .database_name()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string())
    }

    pub fn database_type(&self) -> String {
        self.database_name()
    }

    pub fn name(&self) -> String {
        match &self.metadata {
            Some(m) if !m.name.is_empty() => m.name.clone(),
            Some(m) => m.class_name.clone(),
            None => String::new(),
        }
    }

    pub fn id(&self) -> String {
        self.name()
    }

    pub fn properties(&self) -> &[Property] {
        self.properties.as_slice()
    }

    pub fn property(&self, path: &str) -> Option<&Property> {
        self.properties.get(path)
    }

    /// Wraps params in a record without touching storage.
    pub fn build(&self, params: Params) -> BaseRecord {
        self.record(typed_params(params, &self.properties))
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64, AdapterError> {
        let entity = self.entity()?;
        let mut session = self.orm.fork().await?;
        let count = session.count(entity, &filter.translate(&self.properties)).await?;
        Ok(count)
    }

    pub async fn find(&self, filter: &Filter, params: FindParams) -> Result<Vec<BaseRecord>, AdapterError> {
        let entity = self.entity()?;
        let options = FindOptions {
            order_by: params.sort.map(|s| OrderBy {
                path: s.sort_by,
                direction: s.direction,
            }),
            limit: Some(params.limit.unwrap_or(DEFAULT_LIMIT)),
            offset: Some(params.offset.unwrap_or(DEFAULT_OFFSET)),
        };
        let mut session = self.orm.fork().await?;
        let rows = session
            .find(entity, &filter.translate(&self.properties), &options)
            .await?;
        Ok(rows.iter().map(|r| self.instance_record(r)).collect())
    }

    /// `None` when no record has the id, including ids that cannot be a primary key value.
    pub async fn find_one(&self, id: impl Into<RecordValue>) -> Result<Option<BaseRecord>, AdapterError> {
        let entity = self.entity()?;
        let Some(pk) = coerce_id(entity, id.into()) else {
            return Ok(None);
        };
        let mut session = self.orm.fork().await?;
        let found = session.find_one(entity, &pk).await?;
        Ok(found.map(|r| self.instance_record(&r)))
    }

    /// One membership query. No ids, no metadata or no primary key yield `[]` without querying.
    pub async fn find_many<I, T>(&self, ids: I) -> Result<Vec<BaseRecord>, AdapterError>
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordValue>,
    {
        let Some(entity) = self.metadata.as_deref() else {
            return Ok(Vec::new());
        };
        let Some(pk) = entity.primary_key() else {
            return Ok(Vec::new());
        };
        let ids: Vec<Value> = ids.into_iter().filter_map(|id| coerce_id(entity, id.into())).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut session = self.orm.fork().await?;
        let options = FindOptions::default();
        let rows = session
            .find(entity, &Condition::In(pk.name.clone(), ids), &options)
            .await?;
        Ok(rows.iter().map(|r| self.instance_record(r)).collect())
    }

    /// Validates and persists a new instance; returns it flattened with generated values.
    pub async fn create(&self, params: Params) -> Result<Params, AdapterError> {
        let entity = self.entity()?;
        let mut session = self.orm.fork().await?;
        let mut instance = session.create(entity, unflatten_params(&params));
        self.validate_and_save(session.as_mut(), entity, &mut instance).await?;
        Ok(flatten_params(&instance.to_object(), &self.properties))
    }

    /// Loads, merges `params` into and re-saves one instance.
    pub async fn update(&self, id: impl Into<RecordValue>, params: Params) -> Result<Params, AdapterError> {
        let entity = self.entity()?;
        let not_found = || AdapterError::NotFound(format!("Record to update not found: {}", self.name()));
        let pk = coerce_id(entity, id.into()).ok_or_else(not_found)?;
        if entity.primary_key().is_none() {
            return Err(not_found());
        }
        let mut session = self.orm.fork().await?;
        let mut instance = session.find_one(entity, &pk).await?.ok_or_else(not_found)?;
        instance.assign(stored_fields(entity, unflatten_params(&params)));
        self.validate_and_save(session.as_mut(), entity, &mut instance).await?;
        Ok(flatten_params(&instance.to_object(), &self.properties))
    }

    /// Deletes by primary key without loading. Deleting a missing record succeeds.
    pub async fn delete(&self, id: impl Into<RecordValue>) -> Result<(), AdapterError> {
        let entity = self.entity()?;
        if entity.primary_key().is_none() {
            tracing::warn!(entity = %entity.name, "delete skipped: entity has no primary key");
            return Ok(());
        }
        let Some(pk) = coerce_id(entity, id.into()) else {
            return Ok(());
        };
        let mut session = self.orm.fork().await?;
        let removed = session.native_delete(entity, &pk).await?;
        tracing::debug!(entity = %entity.name, id = %pk, removed, "delete");
        Ok(())
    }

    /// True only when both a model and an ORM are given and the ORM knows the model.
    pub fn is_adapter_for(model: Option<&str>, orm: Option<&dyn Orm>) -> bool {
        match (model, orm) {
            (Some(model), Some(orm)) if !model.is_empty() => orm.metadata().find(model).is_some(),
            _ => false,
        }
    }

    async fn validate_and_save(
        &self,
        session: &mut dyn Session,
        entity: &EntityMeta,
        instance: &mut EntityInstance,
    ) -> Result<(), AdapterError> {
        if let Some(validator) = &self.validator {
            let errors = first_constraints(&validator.validate(instance).await);
            if !errors.is_empty() {
                return Err(AdapterError::Validation(errors));
            }
        }
        match session.persist_and_flush(entity, instance).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_recognized() => Err(AdapterError::Validation(normalize(entity, &e))),
            Err(e) => {
                tracing::error!(entity = %entity.name, error = %e, category = e.category(), "persist failed");
                Err(AdapterError::Persistence(e.to_string()))
            }
        }
    }

    fn entity(&self) -> Result<&EntityMeta, AdapterError> {
        self.metadata
            .as_deref()
            .ok_or_else(|| AdapterError::Config(ConfigError::UnknownEntity(self.model.clone())))
    }

    fn instance_record(&self, instance: &EntityInstance) -> BaseRecord {
        self.record(flatten_params(&instance.to_object(), &self.properties))
    }

    fn record(&self, params: Params) -> BaseRecord {
        BaseRecord::new(
            params,
            self.id(),
            self.properties.id_property().map(|p| p.path().to_string()),
            self.properties.title_property().map(|p| p.path().to_string()),
        )
    }
}

/// Field-keyed error for a recognized ORM failure: the property owning the failing
/// column, the column itself when no property maps to it, else the generic key.
fn normalize(entity: &EntityMeta, e: &OrmError) -> ValidationErrors {
    let key = match e.column() {
        Some(column) => entity
            .field_by_column(column)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| column.to_string()),
        None => GENERIC_ERROR_KEY.to_string(),
    };
    let mut errors = ValidationErrors::new();
    errors.add(key, PERSISTENCE_ERROR_TYPE, e.to_string());
    errors
}

/// Fields an update may change: stored columns other than the primary key.
fn stored_fields(entity: &EntityMeta, shape: Map<String, Value>) -> Map<String, Value> {
    shape
        .into_iter()
        .filter(|(k, _)| {
            entity
                .field(k)
                .map(|f| f.kind.has_column() && !f.primary)
                .unwrap_or(false)
        })
        .collect()
}

/// Coerces an id to the primary key's storage type. `None` when it cannot be one.
fn coerce_id(entity: &EntityMeta, id: RecordValue) -> Option<Value> {
    let pk = entity.primary_key()?;
    if is_integer_type(&pk.column_type) {
        return match id {
            RecordValue::Number(n) => n.as_i64().map(Value::from),
            RecordValue::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            RecordValue::Reference(ReferenceId::Int(n)) => Some(Value::from(n)),
            RecordValue::Reference(ReferenceId::Text(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        };
    }
    match id {
        RecordValue::Null | RecordValue::Json(_) => None,
        other => other.to_text().map(Value::String),
    }
}
