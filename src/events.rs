//! Telemetry events produced as a side artifact of evaluation. They need to be logged to analytics
//! storage; they are never evaluated against.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Attributes;

/// Represents an event capturing the assignment of a feature flag to a subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentEvent {
    /// The key of the feature flag being assigned.
    pub feature_flag: String,
    /// The key of the allocation that the subject was assigned to.
    pub allocation: String,
    /// The key of the experiment associated with the assignment (`"{flag}-{allocation}"`).
    pub experiment: String,
    /// The key of the variation assigned to the subject.
    pub variation: String,
    /// The key identifying the subject receiving the assignment.
    pub subject: String,
    /// Attributes of the subject as supplied by the caller.
    pub subject_attributes: Attributes,
    /// When the assignment happened.
    pub timestamp: DateTime<Utc>,
    /// SDK language and version.
    pub meta_data: HashMap<String, String>,
    /// Extra logging fields configured on the split.
    #[serde(flatten)]
    pub extra_logging: HashMap<String, String>,
}

/// Bandit evaluation event that needs to be logged to analytics storage.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanditEvent {
    pub flag_key: String,
    pub bandit_key: String,
    pub subject: String,
    pub action: String,
    /// Probability with which `action` was selected.
    pub action_probability: f64,
    /// Difference between the best score and the selected action's score.
    pub optimality_gap: f64,
    pub model_version: String,
    pub timestamp: DateTime<Utc>,
    pub subject_numeric_attributes: HashMap<String, f64>,
    pub subject_categorical_attributes: HashMap<String, String>,
    pub action_numeric_attributes: HashMap<String, f64>,
    pub action_categorical_attributes: HashMap<String, String>,
    pub meta_data: HashMap<String, String>,
}

pub(crate) fn event_meta_data() -> HashMap<String, String> {
    HashMap::from([
        ("sdkLanguage".to_owned(), "rust".to_owned()),
        (
            "sdkVersion".to_owned(),
            env!("CARGO_PKG_VERSION").to_owned(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{event_meta_data, AssignmentEvent};

    #[test]
    fn assignment_event_flattens_extra_logging() {
        let event = AssignmentEvent {
            feature_flag: "flag".to_owned(),
            allocation: "allocation".to_owned(),
            experiment: "flag-allocation".to_owned(),
            variation: "on".to_owned(),
            subject: "alice".to_owned(),
            subject_attributes: HashMap::new(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            meta_data: event_meta_data(),
            extra_logging: HashMap::from([("holdout".to_owned(), "short-term".to_owned())]),
        };

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["featureFlag"], json!("flag"));
        assert_eq!(json["holdout"], json!("short-term"));
        assert_eq!(json["metaData"]["sdkLanguage"], json!("rust"));
        assert_eq!(json["timestamp"], json!("2024-01-01T00:00:00Z"));
    }
}
