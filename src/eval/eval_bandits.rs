use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    events::{event_meta_data, AssignmentEvent, BanditEvent},
    ufc::{Assignment, AssignmentValue, VariationType},
    Configuration, ContextAttributes, Error,
};

use super::eval_assignment::get_assignment;

/// Result of evaluating a bandit.
#[derive(Debug, Clone)]
pub struct BanditResult {
    /// Selected variation from the feature flag.
    pub variation: String,
    /// Selected action if any.
    pub action: Option<String>,
    /// Flag assignment event that needs to be logged to analytics storage.
    pub assignment_event: Option<AssignmentEvent>,
    /// Bandit assignment event that needs to be logged to analytics storage.
    pub bandit_event: Option<BanditEvent>,
    /// Reason the flag or bandit could not be fully evaluated, if any. The result still carries
    /// a usable variation.
    pub error: Option<Error>,
}

/// Evaluate the specified string feature flag for the given subject. If resulting variation is
/// a bandit, evaluate the bandit to return the action.
#[allow(clippy::too_many_arguments)]
pub fn get_bandit_action(
    configuration: Option<&Configuration>,
    flag_key: &str,
    subject_key: &str,
    subject_attributes: &ContextAttributes,
    actions: &HashMap<String, ContextAttributes>,
    default_variation: &str,
    now: DateTime<Utc>,
) -> BanditResult {
    let assignment = get_assignment(
        configuration,
        flag_key,
        subject_key,
        &subject_attributes.to_generic_attributes(),
        Some(VariationType::String),
        now,
    );

    let (variation, assignment_event) = match assignment {
        Ok(Assignment {
            value: AssignmentValue::String(variation),
            event,
        }) => (variation, event),
        Ok(_) => {
            // Flag type was checked to be STRING, so the value must be a string too.
            return default_result(default_variation, Error::ConfigurationIntegrity);
        }
        Err(err) => return default_result(default_variation, err),
    };

    let mut result = BanditResult {
        variation,
        action: None,
        assignment_event,
        bandit_event: None,
        error: None,
    };

    // `configuration` is `Some` here because the flag evaluated successfully.
    let Some(configuration) = configuration else {
        return result;
    };

    let Some(bandit_key) = configuration.get_bandit_key(flag_key, &result.variation) else {
        // It's not a bandit variation, just return it.
        return result;
    };

    let Some(bandit) = configuration.get_bandit(bandit_key) else {
        // The flag document links this variation to a bandit, but the bandit models document has
        // no such model.
        log::warn!(target: "flagkit", flag_key, bandit_key; "unable to find bandit configuration");
        result.error = Some(Error::ConfigurationIntegrity);
        return result;
    };

    let evaluation =
        match bandit
            .model_data
            .evaluate(flag_key, subject_key, subject_attributes, actions)
        {
            Ok(evaluation) => evaluation,
            Err(err) => {
                log::warn!(target: "flagkit",
                           flag_key,
                           subject_key,
                           bandit_key;
                           "bandit evaluation failed: {err}");
                result.error = Some(err);
                return result;
            }
        };

    let action_attributes = &actions[&evaluation.action_key];
    result.bandit_event = Some(BanditEvent {
        flag_key: flag_key.to_owned(),
        bandit_key: bandit_key.to_owned(),
        subject: subject_key.to_owned(),
        action: evaluation.action_key.clone(),
        action_probability: evaluation.action_weight,
        optimality_gap: evaluation.optimality_gap,
        model_version: bandit.model_version.clone(),
        timestamp: now,
        subject_numeric_attributes: subject_attributes.numeric.clone(),
        subject_categorical_attributes: subject_attributes.categorical.clone(),
        action_numeric_attributes: action_attributes.numeric.clone(),
        action_categorical_attributes: action_attributes.categorical.clone(),
        meta_data: event_meta_data(),
    });
    result.action = Some(evaluation.action_key);

    log::trace!(target: "flagkit",
                flag_key,
                subject_key,
                bandit_key,
                action:? = result.action;
                "evaluated a bandit");

    result
}

fn default_result(default_variation: &str, error: Error) -> BanditResult {
    BanditResult {
        variation: default_variation.to_owned(),
        action: None,
        assignment_event: None,
        bandit_event: None,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    use super::get_bandit_action;
    use crate::{Configuration, ContextAttributes, Error};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn flags(bandit_variation_share: u64) -> serde_json::Value {
        json!({
            "flags": {
                "banner": {
                    "key": "banner",
                    "enabled": true,
                    "variationType": "STRING",
                    "variations": {
                        "banner_bandit": {"key": "banner_bandit", "value": "banner_bandit"},
                        "control": {"key": "control", "value": "control"}
                    },
                    "allocations": [{
                        "key": "training",
                        "splits": [
                            {
                                "shards": [{"salt": "banner", "ranges": [{"start": 0, "end": bandit_variation_share}]}],
                                "variationKey": "banner_bandit"
                            },
                            {"shards": [], "variationKey": "control"}
                        ]
                    }]
                }
            },
            "bandits": {
                "banner_bandit": [{
                    "key": "banner_bandit",
                    "flagKey": "banner",
                    "variationKey": "banner_bandit",
                    "variationValue": "banner_bandit"
                }]
            }
        })
    }

    fn bandits() -> serde_json::Value {
        json!({
            "bandits": {
                "banner_bandit": {
                    "banditKey": "banner_bandit",
                    "modelName": "falcon",
                    "modelVersion": "123",
                    "modelData": {
                        "gamma": 1.0,
                        "defaultActionScore": 0.0,
                        "actionProbabilityFloor": 0.0,
                        "coefficients": {
                            "nike": {
                                "actionKey": "nike",
                                "intercept": 1.0,
                                "subjectNumericCoefficients": [
                                    {"attributeKey": "age", "coefficient": 0.1, "missingValueCoefficient": 0.0}
                                ],
                                "subjectCategoricalCoefficients": [],
                                "actionNumericCoefficients": [],
                                "actionCategoricalCoefficients": []
                            },
                            "adidas": {
                                "actionKey": "adidas",
                                "intercept": 0.5,
                                "subjectNumericCoefficients": [],
                                "subjectCategoricalCoefficients": [],
                                "actionNumericCoefficients": [],
                                "actionCategoricalCoefficients": []
                            }
                        }
                    }
                }
            }
        })
    }

    fn configuration(with_models: bool, bandit_variation_share: u64) -> Configuration {
        let flags = flags(bandit_variation_share).to_string();
        let bandits = bandits().to_string();
        Configuration::from_json(
            flags.as_bytes(),
            with_models.then_some(bandits.as_bytes()),
        )
        .unwrap()
    }

    fn subject() -> ContextAttributes {
        ContextAttributes {
            numeric: HashMap::from([("age".to_owned(), 30.0)]),
            categorical: HashMap::from([("country".to_owned(), "UK".to_owned())]),
        }
    }

    fn actions() -> HashMap<String, ContextAttributes> {
        HashMap::from([
            (
                "nike".to_owned(),
                ContextAttributes {
                    numeric: HashMap::from([("price".to_owned(), 100.0)]),
                    categorical: HashMap::new(),
                },
            ),
            ("adidas".to_owned(), ContextAttributes::default()),
        ])
    }

    #[test]
    fn selects_action_for_bandit_variation() {
        let configuration = configuration(true, 10_000);

        let result = get_bandit_action(
            Some(&configuration),
            "banner",
            "alice",
            &subject(),
            &actions(),
            "default",
            now(),
        );

        assert_eq!(result.variation, "banner_bandit");
        assert!(result.error.is_none());
        assert_eq!(result.action.as_deref(), Some("nike"));

        let assignment_event = result.assignment_event.unwrap();
        assert_eq!(assignment_event.feature_flag, "banner");
        assert_eq!(assignment_event.variation, "banner_bandit");

        // nike scores 1 + 0.1 * 30 = 4, adidas 0.5. adidas is shuffled first with weight
        // 1 / (2 + 3.5), which stays below alice's selection point of 0.2653.
        let bandit_event = result.bandit_event.unwrap();
        assert_eq!(bandit_event.bandit_key, "banner_bandit");
        assert_eq!(bandit_event.action, "nike");
        assert_eq!(bandit_event.model_version, "123");
        assert_eq!(bandit_event.subject_numeric_attributes["age"], 30.0);
        assert_eq!(bandit_event.action_numeric_attributes["price"], 100.0);
        assert_eq!(bandit_event.action_probability, 0.8181818181818181);
        assert_eq!(bandit_event.optimality_gap, 0.0);
    }

    #[test]
    fn non_bandit_variation_has_no_action() {
        let configuration = configuration(true, 0);

        let result = get_bandit_action(
            Some(&configuration),
            "banner",
            "alice",
            &subject(),
            &actions(),
            "default",
            now(),
        );

        assert_eq!(result.variation, "control");
        assert!(result.action.is_none());
        assert!(result.assignment_event.is_some());
        assert!(result.bandit_event.is_none());
        assert!(result.error.is_none());
    }

    #[test]
    fn no_actions_keeps_variation() {
        let configuration = configuration(true, 10_000);

        let result = get_bandit_action(
            Some(&configuration),
            "banner",
            "alice",
            &subject(),
            &HashMap::new(),
            "default",
            now(),
        );

        assert_eq!(result.variation, "banner_bandit");
        assert!(result.action.is_none());
        assert!(result.bandit_event.is_none());
        assert!(matches!(result.error, Some(Error::NoActionsSupplied)));
    }

    #[test]
    fn missing_bandit_model_is_integrity_error() {
        let configuration = configuration(false, 10_000);

        let result = get_bandit_action(
            Some(&configuration),
            "banner",
            "alice",
            &subject(),
            &actions(),
            "default",
            now(),
        );

        assert_eq!(result.variation, "banner_bandit");
        assert!(result.action.is_none());
        assert!(matches!(result.error, Some(Error::ConfigurationIntegrity)));
    }

    #[test]
    fn evaluation_failure_returns_default_variation() {
        let configuration = configuration(true, 10_000);

        let result = get_bandit_action(
            Some(&configuration),
            "missing",
            "alice",
            &subject(),
            &actions(),
            "default",
            now(),
        );
        assert_eq!(result.variation, "default");
        assert!(result.assignment_event.is_none());
        assert!(matches!(result.error, Some(Error::FlagNotFound)));

        let result = get_bandit_action(
            None,
            "banner",
            "alice",
            &subject(),
            &actions(),
            "default",
            now(),
        );
        assert_eq!(result.variation, "default");
        assert!(matches!(result.error, Some(Error::ConfigurationMissing)));
    }
}
