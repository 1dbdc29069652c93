//! Native query-condition grammar understood by every ORM backend.

use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Matches every row.
    All,
    And(Vec<Condition>),
    Eq(String, Value),
    In(String, Vec<Value>),
    Gte(String, Value),
    Lte(String, Value),
    /// Case-insensitive substring match; the needle carries no wildcards.
    Contains(String, String),
    IsNull(String),
}

impl Condition {
    /// Joins conditions, collapsing trivial cases.
    pub fn and(mut parts: Vec<Condition>) -> Self {
        parts.retain(|c| *c != Condition::All);
        match parts.len() {
            0 => Condition::All,
            1 => parts.remove(0),
            _ => Condition::And(parts),
        }
    }

    /// Every path referenced by the condition.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Condition::All => Vec::new(),
            Condition::And(parts) => parts.iter().flat_map(Condition::paths).collect(),
            Condition::Eq(p, _)
            | Condition::In(p, _)
            | Condition::Gte(p, _)
            | Condition::Lte(p, _)
            | Condition::Contains(p, _)
            | Condition::IsNull(p) => vec![p.as_str()],
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(format!("invalid sort direction: {} (expected asc or desc)", s)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub path: String,
    pub direction: Direction,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}
