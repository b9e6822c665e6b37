use std::{borrow::Cow, collections::HashMap};

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Subject attributes used in flag evaluation.
///
/// # Examples
/// ```
/// # use flagkit::{Attributes, AttributeValue};
/// let attributes = [
///     ("age".to_owned(), 30.0.into()),
///     ("is_premium_member".to_owned(), true.into()),
///     ("username".to_owned(), "john_doe".into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, AttributeValue>;

/// Value of a single subject attribute.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, and `bool`.
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A null value or absence of value.
    Null,
}

impl AttributeValue {
    /// Coerce the value to a string for string-based operators. Returns `None` for `Null`.
    ///
    /// Numbers use the shortest representation that round-trips, so `42.0` becomes `"42"`.
    pub(crate) fn coerce_to_string(&self) -> Option<Cow<'_, str>> {
        match self {
            AttributeValue::String(s) => Some(Cow::Borrowed(s)),
            AttributeValue::Number(n) => Some(Cow::Owned(n.to_string())),
            AttributeValue::Boolean(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            AttributeValue::Null => None,
        }
    }

    /// Coerce the value to a number for comparison operators. Strings are parsed.
    pub(crate) fn coerce_to_number(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Boolean(_) | AttributeValue::Null => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

/// `ContextAttributes` are subject or action attributes split by their semantics. Used for bandit
/// evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAttributes {
    /// Numeric attributes are quantitative (e.g., real numbers) and define a scale.
    ///
    /// Not all numbers are numeric attributes. If a number is used to represent an enumeration or
    /// on/off values, it is a categorical attribute.
    #[serde(default, alias = "numericAttributes")]
    pub numeric: HashMap<String, f64>,
    /// Categorical attributes have a finite set of values that are not directly comparable.
    #[serde(default, alias = "categoricalAttributes")]
    pub categorical: HashMap<String, String>,
}

impl From<Attributes> for ContextAttributes {
    fn from(value: Attributes) -> Self {
        ContextAttributes::from_iter(value)
    }
}

impl<K: Into<String>> FromIterator<(K, AttributeValue)> for ContextAttributes {
    fn from_iter<T: IntoIterator<Item = (K, AttributeValue)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(ContextAttributes::default(), |mut acc, (key, value)| {
                match value {
                    AttributeValue::String(value) => {
                        acc.categorical.insert(key.into(), value);
                    }
                    AttributeValue::Number(value) => {
                        acc.numeric.insert(key.into(), value);
                    }
                    AttributeValue::Boolean(value) => {
                        // Keeps flag evaluation inside bandit evaluation consistent with calling
                        // `get_assignment()` with generic attributes.
                        acc.categorical.insert(key.into(), value.to_string());
                    }
                    AttributeValue::Null => {
                        // Nulls are missing values.
                    }
                }
                acc
            })
    }
}

impl ContextAttributes {
    /// Convert contextual attributes to generic `Attributes`.
    pub fn to_generic_attributes(&self) -> Attributes {
        let mut result = HashMap::with_capacity(self.numeric.len() + self.categorical.len());
        for (key, value) in &self.numeric {
            result.insert(key.clone(), AttributeValue::Number(*value));
        }
        for (key, value) in &self.categorical {
            result.insert(key.clone(), AttributeValue::String(value.clone()));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeValue, Attributes, ContextAttributes};

    #[test]
    fn coerces_numbers_without_trailing_zero() {
        assert_eq!(
            AttributeValue::Number(42.0).coerce_to_string().as_deref(),
            Some("42")
        );
        assert_eq!(
            AttributeValue::Number(1.5).coerce_to_string().as_deref(),
            Some("1.5")
        );
        assert_eq!(AttributeValue::Null.coerce_to_string(), None);
    }

    #[test]
    fn coerces_numeric_strings() {
        assert_eq!(AttributeValue::from("12.5").coerce_to_number(), Some(12.5));
        assert_eq!(AttributeValue::from("twelve").coerce_to_number(), None);
        assert_eq!(AttributeValue::Boolean(true).coerce_to_number(), None);
    }

    #[test]
    fn splits_attributes_by_kind() {
        let attributes: Attributes = [
            ("age".to_owned(), 30.0.into()),
            ("country".to_owned(), "UA".into()),
            ("premium".to_owned(), true.into()),
            ("nothing".to_owned(), AttributeValue::Null),
        ]
        .into_iter()
        .collect();

        let context = ContextAttributes::from(attributes);

        assert_eq!(context.numeric.get("age"), Some(&30.0));
        assert_eq!(context.categorical.get("country").map(String::as_str), Some("UA"));
        assert_eq!(context.categorical.get("premium").map(String::as_str), Some("true"));
        assert!(!context.numeric.contains_key("nothing"));
        assert!(!context.categorical.contains_key("nothing"));
    }

    #[test]
    fn deserializes_test_data_shape() {
        let context: ContextAttributes = serde_json::from_str(
            r#"{"numericAttributes": {"age": 25}, "categoricalAttributes": {"tier": "gold"}}"#,
        )
        .unwrap();
        assert_eq!(context.numeric.get("age"), Some(&25.0));
        assert_eq!(context.categorical.get("tier").map(String::as_str), Some("gold"));
    }
}
