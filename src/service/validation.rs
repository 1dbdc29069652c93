//! Validation hook called before every save, and a rule-driven implementation of it.

use crate::error::ValidationErrors;
use crate::orm::EntityInstance;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Every constraint a property failed, in check order: `(constraint name, message)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub property: String,
    pub constraints: Vec<(String, String)>,
}

impl Violation {
    pub fn new(property: &str) -> Self {
        Violation {
            property: property.to_string(),
            constraints: Vec::new(),
        }
    }

    pub fn constraint(mut self, name: &str, message: impl Into<String>) -> Self {
        self.constraints.push((name.to_string(), message.into()));
        self
    }
}

/// Checks an instance before it is persisted. An empty result means valid.
#[async_trait]
pub trait Validate: Send + Sync {
    async fn validate(&self, instance: &EntityInstance) -> Vec<Violation>;
}

#[async_trait]
impl<F> Validate for F
where
    F: Fn(&EntityInstance) -> Vec<Violation> + Send + Sync,
{
    async fn validate(&self, instance: &EntityInstance) -> Vec<Violation> {
        self(instance)
    }
}

/// Keeps only the first constraint of each violated property. Violations without
/// constraints are ignored.
pub fn first_constraints(violations: &[Violation]) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for v in violations {
        if let Some((kind, message)) = v.constraints.first() {
            errors.add(v.property.as_str(), kind.as_str(), message.as_str());
        }
    }
    errors
}

/// Per-property rule. Unset checks are skipped.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    #[serde(default)]
    pub required: bool,
    /// `email` or `uuid`.
    pub format: Option<String>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub pattern: Option<String>,
    pub allowed: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl ValidationRule {
    pub fn required() -> Self {
        ValidationRule {
            required: true,
            ..Self::default()
        }
    }

    pub fn format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn min_length(mut self, n: u32) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: u32) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn minimum(mut self, n: f64) -> Self {
        self.minimum = Some(n);
        self
    }

    pub fn maximum(mut self, n: f64) -> Self {
        self.maximum = Some(n);
        self
    }
}

/// [`Validate`] driven by per-entity, per-property rules.
#[derive(Clone, Debug, Default)]
pub struct RuleValidator {
    rules: HashMap<String, Vec<(String, ValidationRule)>>,
}

impl RuleValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, entity: &str, property: &str, rule: ValidationRule) -> Self {
        self.rules
            .entry(entity.to_string())
            .or_default()
            .push((property.to_string(), rule));
        self
    }

    /// Loads rules from `{ "Entity": { "property": { ...rule } } }`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let doc: HashMap<String, serde_json::Map<String, Value>> = serde_json::from_str(json)?;
        let mut validator = RuleValidator::new();
        for (entity, props) in doc {
            for (property, rule) in props {
                let rule: ValidationRule = serde_json::from_value(rule)?;
                validator = validator.rule(&entity, &property, rule);
            }
        }
        Ok(validator)
    }

    fn check(&self, instance: &EntityInstance) -> Vec<Violation> {
        let Some(rules) = self.rules.get(instance.entity()) else {
            return Vec::new();
        };
        rules
            .iter()
            .map(|(property, rule)| Violation {
                property: property.clone(),
                constraints: check_value(property, instance.get(property), rule),
            })
            .filter(|v| !v.constraints.is_empty())
            .collect()
    }
}

#[async_trait]
impl Validate for RuleValidator {
    async fn validate(&self, instance: &EntityInstance) -> Vec<Violation> {
        self.check(instance)
    }
}

fn check_value(property: &str, v: Option<&Value>, rule: &ValidationRule) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut fail = |name: &str, message: String| out.push((name.to_string(), message));
    let v = match v {
        None | Some(Value::Null) => {
            if rule.required {
                fail("isNotEmpty", format!("{} should not be empty", property));
            }
            return out;
        }
        Some(Value::String(s)) if s.is_empty() && rule.required => {
            fail("isNotEmpty", format!("{} should not be empty", property));
            return out;
        }
        Some(v) => v,
    };
    if let Some(format) = &rule.format {
        let s = v.as_str().unwrap_or("");
        match format.to_lowercase().as_str() {
            "email" if !is_email(s) => fail("isEmail", format!("{} must be an email", property)),
            "uuid" if uuid::Uuid::parse_str(s).is_err() => fail("isUuid", format!("{} must be a UUID", property)),
            _ => {}
        }
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(min) = rule.min_length.filter(|&min| len < min as usize) {
            fail(
                "minLength",
                format!("{} must be longer than or equal to {} characters", property, min),
            );
        }
        if let Some(max) = rule.max_length.filter(|&max| len > max as usize) {
            fail(
                "maxLength",
                format!("{} must be shorter than or equal to {} characters", property, max),
            );
        }
        if let Some(pattern) = &rule.pattern {
            match Regex::new(pattern) {
                Ok(re) if re.is_match(s) => {}
                Ok(_) => fail("matches", format!("{} must match /{}/ regular expression", property, pattern)),
                Err(_) => fail("matches", format!("invalid pattern for {}", property)),
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            let listed: Vec<String> = allowed
                .iter()
                .map(|a| a.as_str().map(str::to_string).unwrap_or_else(|| a.to_string()))
                .collect();
            fail(
                "isIn",
                format!("{} must be one of the following values: {}", property, listed.join(", ")),
            );
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum.filter(|&min| n < min) {
            fail("min", format!("{} must not be less than {}", property, min));
        }
        if let Some(max) = rule.maximum.filter(|&max| n > max) {
            fail("max", format!("{} must not be greater than {}", property, max));
        }
    }
    out
}

fn is_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'),
        None => false,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}
