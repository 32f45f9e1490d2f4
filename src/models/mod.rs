//! GRC domain records and their display models
//!
//! Records travel as JSON objects identified by an `id` field. The typed
//! structs here are used for table output and risk scoring; list and cache
//! operations work on `serde_json::Value` through the [`Identified`] and
//! [`SoftDelete`] traits.

pub mod display;
pub mod records;
pub mod resource;
pub mod risk;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use display::{ActionPlanDisplay, AuditDisplay, ControlDisplay, RegulationDisplay, RiskDisplay};
pub use records::{ActionPlan, Audit, Control, Regulation};
pub use resource::Resource;
pub use risk::{Risk, RiskLevel, residual_score, risk_score};

/// Record identifier. The backend uses integers; some imports carry strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Read the identifier from a JSON value (`7` or `"7"`).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    /// Whether this id equals another regardless of representation
    pub fn matches(&self, other: &RecordId) -> bool {
        self == other || self.to_string() == other.to_string()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Str(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<i64>()
            .map(RecordId::Int)
            .unwrap_or_else(|_| RecordId::Str(s.to_string())))
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

/// A record with an identity
pub trait Identified {
    fn record_id(&self) -> Option<RecordId>;

    fn has_id(&self, id: &RecordId) -> bool {
        self.record_id().is_some_and(|own| own.matches(id))
    }
}

impl Identified for Value {
    fn record_id(&self) -> Option<RecordId> {
        self.get("id").and_then(RecordId::from_value)
    }
}

/// A record that can be soft-deleted and restored
pub trait SoftDelete {
    fn set_deleted(&mut self, deleted_at: Option<String>);

    fn is_deleted(&self) -> bool;
}

impl SoftDelete for Value {
    fn set_deleted(&mut self, deleted_at: Option<String>) {
        if let Value::Object(map) = self {
            map.insert("isDeleted".to_string(), Value::Bool(deleted_at.is_some()));
            map.insert(
                "deletedAt".to_string(),
                deleted_at.map(Value::String).unwrap_or(Value::Null),
            );
        }
    }

    fn is_deleted(&self) -> bool {
        self.get("isDeleted").and_then(Value::as_bool).unwrap_or(false)
    }
}
