//! Resource and Database adapters, and the validation hook they call before saving.

mod database;
mod resource;
mod validation;
pub use database::Database;
pub use resource::{FindParams, Resource, Sort, DEFAULT_DATABASE_NAME, DEFAULT_LIMIT, DEFAULT_OFFSET};
pub use validation::{first_constraints, RuleValidator, Validate, ValidationRule, Violation};
