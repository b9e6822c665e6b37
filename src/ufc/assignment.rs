use serde::{Deserialize, Serialize};

use crate::events::AssignmentEvent;

use super::VariationType;

/// Result of assignment evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Assignment value that should be returned to the user.
    pub value: AssignmentValue,
    /// Optional assignment event that should be logged to storage.
    pub event: Option<AssignmentEvent>,
}

/// Value assigned to a subject as a result of feature flag evaluation.
///
/// Serialized as a two-field object with `type` and `value`:
/// ```json
/// {"type":"JSON","value":{"hello":"world"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A numeric value (floating-point).
    Numeric(f64),
    /// A boolean value.
    Boolean(bool),
    /// Arbitrary JSON value.
    Json(serde_json::Value),
}

impl AssignmentValue {
    /// Variation type this value belongs to.
    pub fn variation_type(&self) -> VariationType {
        match self {
            AssignmentValue::String(_) => VariationType::String,
            AssignmentValue::Integer(_) => VariationType::Integer,
            AssignmentValue::Numeric(_) => VariationType::Numeric,
            AssignmentValue::Boolean(_) => VariationType::Boolean,
            AssignmentValue::Json(_) => VariationType::Json,
        }
    }

    /// Returns the value as a string slice if it is a string.
    ///
    /// ```
    /// # use flagkit::AssignmentValue;
    /// let value = AssignmentValue::String("example".into());
    /// assert_eq!(value.as_str(), Some("example"));
    /// ```
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AssignmentValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Consumes the value, returning the owned string if it is a string.
    pub fn into_string(self) -> Option<String> {
        match self {
            AssignmentValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AssignmentValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            AssignmentValue::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AssignmentValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            AssignmentValue::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Consumes the value, returning the JSON payload if it is a JSON value.
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            AssignmentValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::AssignmentValue;

    #[test]
    fn serializes_with_type_tag() {
        assert_eq!(
            serde_json::to_value(AssignmentValue::Json(json!({"hello": "world"}))).unwrap(),
            json!({"type": "JSON", "value": {"hello": "world"}})
        );
        assert_eq!(
            serde_json::to_value(AssignmentValue::Integer(42)).unwrap(),
            json!({"type": "INTEGER", "value": 42})
        );
    }

    #[test]
    fn accessors_check_variant() {
        let value = AssignmentValue::Boolean(true);
        assert_eq!(value.as_boolean(), Some(true));
        assert_eq!(value.as_integer(), None);
        assert_eq!(value.as_str(), None);
    }
}
