use std::collections::HashMap;

use derive_more::From;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Deserializer, Serialize};

use super::AssignmentValue;

#[allow(missing_docs)]
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Universal Flag Configuration. This is the flag document served by the configuration endpoint.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UniversalFlagConfig {
    /// When configuration was last updated.
    #[serde(default)]
    pub created_at: Option<Timestamp>,
    /// Environment this configuration belongs to.
    #[serde(default)]
    pub environment: Option<Environment>,
    /// Flags configuration.
    ///
    /// Value is wrapped in `TryParse` so that if we fail to parse one flag (e.g., new server
    /// format), we can still serve other flags.
    pub flags: HashMap<String, TryParse<Flag>>,
    /// `bandits` field connects string feature flags to bandits. Bandit models are served
    /// separately.
    #[serde(default)]
    pub bandits: HashMap<String, Vec<BanditVariation>>,
}

/// Environment the flag document was produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Name of the environment.
    pub name: String,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Flag {
    pub key: String,
    pub enabled: bool,
    pub variation_type: VariationType,
    pub variations: HashMap<String, Variation>,
    pub allocations: Vec<Allocation>,
    #[serde(
        default = "default_total_shards",
        deserialize_with = "deserialize_total_shards"
    )]
    pub total_shards: u64,
}

pub(crate) const DEFAULT_TOTAL_SHARDS: u64 = 10_000;

fn default_total_shards() -> u64 {
    DEFAULT_TOTAL_SHARDS
}

/// Zero shards would make every modulo operation panic, so it's treated as unset.
fn deserialize_total_shards<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Option::<u64>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(0) => DEFAULT_TOTAL_SHARDS,
        Some(n) => n,
    })
}

/// Type of the variation.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum VariationType {
    String,
    Integer,
    Numeric,
    Boolean,
    Json,
}

/// Raw variation payload.
///
/// `Value` is untagged, so the exact type is only known once it's combined with the flag's
/// [`VariationType`].
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum Value {
    /// Boolean maps to [`AssignmentValue::Boolean`].
    Boolean(bool),
    /// Number maps to either [`AssignmentValue::Integer`] or [`AssignmentValue::Numeric`].
    Number(f64),
    /// String maps to either [`AssignmentValue::String`] or [`AssignmentValue::Json`].
    String(String),
}

impl Value {
    /// Try to convert `Value` to [`AssignmentValue`] under the given [`VariationType`].
    pub(crate) fn to_assignment_value(&self, ty: VariationType) -> Option<AssignmentValue> {
        Some(match ty {
            VariationType::String => AssignmentValue::String(self.as_str()?.to_owned()),
            VariationType::Integer => AssignmentValue::Integer(self.as_integer()?),
            VariationType::Numeric => AssignmentValue::Numeric(self.as_number()?),
            VariationType::Boolean => AssignmentValue::Boolean(self.as_boolean()?),
            VariationType::Json => AssignmentValue::Json(serde_json::from_str(self.as_str()?).ok()?),
        })
    }

    fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        let f = self.as_number()?;
        // `as` saturates, so values outside [-2^63, 2^63) must be rejected before the cast.
        if !(f >= i64::MIN as f64 && f < i64::MAX as f64) {
            return None;
        }
        let i = f as i64;
        if i as f64 == f {
            Some(i)
        } else {
            None
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Variation {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Allocation {
    pub key: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Allocation is active starting from this moment (inclusive).
    #[serde(default)]
    pub start_at: Option<Timestamp>,
    /// Allocation is active up to this moment (exclusive).
    #[serde(default)]
    pub end_at: Option<Timestamp>,
    pub splits: Vec<Split>,
    #[serde(default = "default_do_log")]
    pub do_log: bool,
}

fn default_do_log() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone, From)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Rule {
    pub conditions: Vec<Condition>,
}

/// `Condition` checks that the subject's `attribute` matches the condition value under the given
/// operator.
///
/// The condition value is interpreted once, when the configuration is loaded: regexes are compiled,
/// semantic versions and numbers are parsed, and set members are normalized to lowercase.
#[derive(Debug, Deserialize, Clone)]
#[serde(from = "ConditionWire")]
pub struct Condition {
    /// Name of the subject attribute to check.
    pub attribute: String,
    pub(crate) check: ConditionCheck,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConditionWire {
    operator: ConditionOperator,
    attribute: String,
    value: ConditionValue,
}

/// Possible condition types.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionOperator {
    /// Matches regex. Condition value must be a regex string.
    Matches,
    /// Regex does not match. Condition value must be a regex string.
    NotMatches,
    /// Greater than or equal. Condition value must either be a number or a semver string.
    Gte,
    /// Greater than. Condition value must either be a number or a semver string.
    Gt,
    /// Less than or equal. Condition value must either be a number or a semver string.
    Lte,
    /// Less than. Condition value must either be a number or a semver string.
    Lt,
    /// One of values. Condition value must be a list of strings. Match is case-insensitive.
    OneOf,
    /// Not one of values. Condition value must be a list of strings. Match is case-insensitive.
    ///
    /// Null/absent attributes fail this condition.
    NotOneOf,
    /// Null check. Condition value must be a boolean: `true` checks for null, `false` for not null.
    IsNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum ConditionValue {
    Single(Value),
    // Only string arrays are currently supported.
    Multiple(Vec<String>),
}

impl<T: Into<Value>> From<T> for ConditionValue {
    fn from(value: T) -> Self {
        Self::Single(value.into())
    }
}
impl From<Vec<String>> for ConditionValue {
    fn from(value: Vec<String>) -> Self {
        Self::Multiple(value)
    }
}
impl From<Vec<&str>> for ConditionValue {
    fn from(value: Vec<&str>) -> Self {
        Self::Multiple(value.into_iter().map(ToOwned::to_owned).collect())
    }
}

/// Load-time interpretation of a condition.
#[derive(Debug, Clone)]
pub(crate) enum ConditionCheck {
    Matches {
        regex: Box<Regex>,
        expected: bool,
    },
    OneOf {
        /// Lowercased set members.
        values: Vec<String>,
        expected: bool,
    },
    Comparison {
        operator: ComparisonOperator,
        value: ComparisonValue,
    },
    IsNull {
        expected: bool,
    },
    /// Condition value is unusable for the operator (e.g., invalid regex). Never matches.
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ComparisonOperator {
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Debug, Clone)]
pub(crate) enum ComparisonValue {
    Version(Version),
    Number(f64),
}

impl Condition {
    /// Create a condition, interpreting `value` for the given `operator`.
    pub fn new(
        attribute: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<ConditionValue>,
    ) -> Condition {
        Condition::from(ConditionWire {
            operator,
            attribute: attribute.into(),
            value: value.into(),
        })
    }
}

impl From<ConditionWire> for Condition {
    fn from(wire: ConditionWire) -> Condition {
        let check = compile_check(wire.operator, wire.value).unwrap_or_else(|| {
            log::warn!(target: "flagkit",
                       attribute:display = wire.attribute,
                       operator:? = wire.operator;
                       "condition value is invalid for operator, condition will never match");
            ConditionCheck::Invalid
        });
        Condition {
            attribute: wire.attribute,
            check,
        }
    }
}

fn compile_check(operator: ConditionOperator, value: ConditionValue) -> Option<ConditionCheck> {
    use ConditionOperator as Op;

    Some(match operator {
        Op::Matches | Op::NotMatches => {
            let ConditionValue::Single(Value::String(pattern)) = value else {
                return None;
            };
            ConditionCheck::Matches {
                regex: Box::new(Regex::new(&pattern).ok()?),
                expected: operator == Op::Matches,
            }
        }
        Op::OneOf | Op::NotOneOf => {
            let ConditionValue::Multiple(values) = value else {
                return None;
            };
            ConditionCheck::OneOf {
                values: values.iter().map(|v| v.to_lowercase()).collect(),
                expected: operator == Op::OneOf,
            }
        }
        Op::IsNull => {
            let ConditionValue::Single(Value::Boolean(expected)) = value else {
                return None;
            };
            ConditionCheck::IsNull { expected }
        }
        Op::Gte | Op::Gt | Op::Lte | Op::Lt => {
            let operator = match operator {
                Op::Gt => ComparisonOperator::Gt,
                Op::Gte => ComparisonOperator::Gte,
                Op::Lt => ComparisonOperator::Lt,
                _ => ComparisonOperator::Lte,
            };
            let value = match value {
                ConditionValue::Single(Value::Number(n)) => ComparisonValue::Number(n),
                ConditionValue::Single(Value::String(s)) => match Version::parse(&s) {
                    Ok(version) => ComparisonValue::Version(version),
                    Err(_) => ComparisonValue::Number(s.trim().parse().ok()?),
                },
                _ => return None,
            };
            ConditionCheck::Comparison { operator, value }
        }
    })
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Split {
    pub shards: Vec<Shard>,
    pub variation_key: String,
    /// Extra fields attached to assignment events produced by this split.
    #[serde(default)]
    pub extra_logging: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Shard {
    pub salt: String,
    pub ranges: Vec<ShardRange>,
}

/// Half-open `[start, end)` range of shard values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ShardRange {
    pub start: u64,
    pub end: u64,
}

impl ShardRange {
    /// Return `true` if `shard` falls within `[start, end)`.
    pub fn contains(&self, shard: u64) -> bool {
        self.start <= shard && shard < self.end
    }
}

/// `BanditVariation` associates a variation in feature flag with a bandit.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BanditVariation {
    /// Key of the bandit.
    pub key: String,
    /// Key of the flag.
    pub flag_key: String,
    /// Today it's the same as `variation_value`.
    pub variation_key: String,
    /// String variation value.
    pub variation_value: String,
}
