use std::cmp::Ordering;

use semver::Version;

use crate::{
    ufc::{ComparisonOperator, ComparisonValue, Condition, ConditionCheck, Rule},
    AttributeValue,
};

use super::subject::Subject;

/// Returns `true` if any of the rules matches. The "no rules means match" case is handled by the
/// caller.
pub(super) fn matches_any_rule(rules: &[Rule], subject: &Subject) -> bool {
    rules.iter().any(|rule| rule.eval(subject))
}

impl Rule {
    pub(super) fn eval(&self, subject: &Subject) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.eval(subject.get_attribute(&condition.attribute)))
    }
}

impl Condition {
    /// Apply the condition to the attribute value. Returns `false` if the condition cannot be
    /// applied or there's a misconfiguration.
    fn eval(&self, attribute: Option<&AttributeValue>) -> bool {
        self.check.try_eval(attribute).unwrap_or(false)
    }
}

impl ConditionCheck {
    /// Try applying the check, returning `None` if it cannot be applied.
    fn try_eval(&self, attribute: Option<&AttributeValue>) -> Option<bool> {
        // Null is indistinguishable from absence for every operator.
        let attribute = attribute.filter(|value| **value != AttributeValue::Null);

        match self {
            Self::IsNull { expected } => Some(attribute.is_none() == *expected),

            Self::Matches { regex, expected } => {
                let s = attribute?.coerce_to_string()?;
                Some(regex.is_match(&s) == *expected)
            }

            Self::OneOf { values, expected } => {
                let s = attribute?.coerce_to_string()?.to_lowercase();
                let is_one_of = values.iter().any(|v| *v == s);
                Some(is_one_of == *expected)
            }

            Self::Comparison { operator, value } => {
                let ordering = match value {
                    ComparisonValue::Version(condition_version) => {
                        let attribute_version = match attribute? {
                            AttributeValue::String(s) => Version::parse(s).ok()?,
                            _ => return None,
                        };
                        attribute_version.cmp(condition_version)
                    }
                    ComparisonValue::Number(condition_value) => {
                        let attribute_value = attribute?.coerce_to_number()?;
                        attribute_value.partial_cmp(condition_value)?
                    }
                };
                Some(operator.accepts(ordering))
            }

            Self::Invalid => None,
        }
    }
}

impl ComparisonOperator {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Gt => ordering == Ordering::Greater,
            Self::Gte => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Lte => ordering != Ordering::Greater,
        }
    }
}
