//! Database adapter: every entity registered with an ORM as a resource.

use crate::orm::Orm;
use crate::service::resource::{Resource, DEFAULT_DATABASE_NAME};
use crate::service::validation::Validate;
use std::sync::Arc;

#[derive(Clone)]
pub struct Database {
    orm: Arc<dyn Orm>,
    validator: Option<Arc<dyn Validate>>,
}

impl Database {
    pub fn new(orm: Arc<dyn Orm>) -> Self {
        Database { orm, validator: None }
    }

    /// Hook handed to every resource this database builds.
    pub fn with_validator(mut self, validator: Arc<dyn Validate>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn name(&self) -> String {
        self.orm
            .database_name()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string())
    }

    /// One resource per registered entity, in registration order.
    pub fn resources(&self) -> Vec<Resource> {
        self.orm
            .metadata()
            .all()
            .iter()
            .map(|meta| self.build(&meta.name))
            .collect()
    }

    /// Resource for an entity by name or class name.
    pub fn resource(&self, model: &str) -> Option<Resource> {
        Resource::is_adapter_for(Some(model), Some(self.orm.as_ref())).then(|| self.build(model))
    }

    /// True when an ORM is given and it has at least one registered entity.
    pub fn is_adapter_for(orm: Option<&dyn Orm>) -> bool {
        orm.map(|o| !o.metadata().is_empty()).unwrap_or(false)
    }

    fn build(&self, model: &str) -> Resource {
        let resource = Resource::new(Arc::clone(&self.orm), model);
        match &self.validator {
            Some(v) => resource.with_validator(Arc::clone(v)),
            None => resource,
        }
    }
}
