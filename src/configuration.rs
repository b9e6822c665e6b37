use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{
    bandits::{BanditConfiguration, BanditResponse},
    configuration_fetcher::ConfigurationResponse,
    ufc::{BanditVariation, Environment, Flag, TryParse, UniversalFlagConfig},
    Result,
};

/// Remote configuration for the client. It's a central piece that defines client behavior.
///
/// A `Configuration` is immutable once built. The bandit index is computed during construction so
/// that publishing a snapshot is a single pointer swap.
#[derive(Debug)]
pub struct Configuration {
    /// Timestamp when configuration was built by the SDK.
    pub fetched_at: DateTime<Utc>,
    /// Environment the flag document was produced for, if the server reported one.
    pub environment: Option<Environment>,
    /// Flags configuration.
    pub flags: HashMap<String, TryParse<Flag>>,
    /// Bandits configuration.
    pub bandits: Option<BanditResponse>,
    /// flag key → variation value → bandit variation.
    bandit_index: HashMap<String, HashMap<String, BanditVariation>>,
}

impl Configuration {
    /// Create a new configuration from parsed server responses.
    pub fn from_server_response(
        config: UniversalFlagConfig,
        bandits: Option<BanditResponse>,
    ) -> Configuration {
        let mut bandit_index: HashMap<String, HashMap<String, BanditVariation>> = HashMap::new();
        for variation in config.bandits.into_values().flatten() {
            bandit_index
                .entry(variation.flag_key.clone())
                .or_default()
                .insert(variation.variation_value.clone(), variation);
        }

        Configuration {
            fetched_at: Utc::now(),
            environment: config.environment,
            flags: config.flags,
            bandits,
            bandit_index,
        }
    }

    /// Parse flag document and optional bandit models document.
    ///
    /// Malformed input fails as a whole; nothing is partially applied. Individual flags that fail
    /// to parse are still isolated inside an otherwise valid document.
    pub fn from_json(flags: &[u8], bandits: Option<&[u8]>) -> Result<Configuration> {
        let config = serde_json::from_slice::<UniversalFlagConfig>(flags)?;
        let bandits = bandits
            .map(serde_json::from_slice::<BanditResponse>)
            .transpose()?;
        Ok(Configuration::from_server_response(config, bandits))
    }

    /// Build configuration from a raw fetcher response.
    pub fn from_server_response_bytes(response: &ConfigurationResponse) -> Result<Configuration> {
        Configuration::from_json(&response.flags, response.bandits.as_deref())
    }

    /// Return a bandit key for the specified flag key and string flag variation.
    pub(crate) fn get_bandit_key<'a>(&'a self, flag_key: &str, variation: &str) -> Option<&'a str> {
        self.bandit_index
            .get(flag_key)
            .and_then(|variations| variations.get(variation))
            .map(|variation| variation.key.as_str())
    }

    /// Return bandit configuration for the given key.
    ///
    /// Returns `None` if bandits are missing or the bandit does not exist.
    pub(crate) fn get_bandit<'a>(&'a self, bandit_key: &str) -> Option<&'a BanditConfiguration> {
        self.bandits.as_ref()?.bandits.get(bandit_key)
    }

    /// Get a set of all available flags. Note that this may return both disabled flags and flags
    /// with bad configuration.
    pub fn flag_keys(&self) -> HashSet<String> {
        self.flags.keys().cloned().collect()
    }

    /// Whether the flag document references any bandits.
    pub fn has_bandits(&self) -> bool {
        !self.bandit_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;

    use super::Configuration;

    const FLAGS: &str = r#"{
        "createdAt": "2024-07-18T00:00:00Z",
        "environment": {"name": "Test"},
        "flags": {
            "banner": {
                "key": "banner",
                "enabled": true,
                "variationType": "STRING",
                "variations": {"bandit": {"key": "bandit", "value": "bandit"}},
                "allocations": []
            },
            "broken": {"key": "broken", "variationType": "FUTURE_TYPE"}
        },
        "bandits": {
            "banner_bandit": [{
                "key": "banner_bandit",
                "flagKey": "banner",
                "variationKey": "bandit",
                "variationValue": "bandit"
            }]
        }
    }"#;

    const BANDITS: &str = r#"{
        "bandits": {
            "banner_bandit": {
                "banditKey": "banner_bandit",
                "modelName": "falcon",
                "modelVersion": "v1",
                "modelData": {
                    "gamma": 1.0,
                    "defaultActionScore": 0.0,
                    "actionProbabilityFloor": 0.0,
                    "coefficients": {}
                }
            }
        }
    }"#;

    #[test]
    fn indexes_bandit_variations() {
        let configuration =
            Configuration::from_json(FLAGS.as_bytes(), Some(BANDITS.as_bytes())).unwrap();

        assert_eq!(
            configuration.get_bandit_key("banner", "bandit"),
            Some("banner_bandit")
        );
        assert_eq!(configuration.get_bandit_key("banner", "other"), None);
        assert_eq!(configuration.get_bandit_key("missing", "bandit"), None);
        assert_eq!(
            configuration
                .get_bandit("banner_bandit")
                .map(|b| b.model_version.as_str()),
            Some("v1")
        );
        assert!(configuration.has_bandits());
        assert_eq!(
            configuration.environment.as_ref().map(|e| e.name.as_str()),
            Some("Test")
        );
    }

    #[test]
    fn bandit_lookup_without_models_document() {
        let configuration = Configuration::from_json(FLAGS.as_bytes(), None).unwrap();

        assert_eq!(
            configuration.get_bandit_key("banner", "bandit"),
            Some("banner_bandit")
        );
        assert!(configuration.get_bandit("banner_bandit").is_none());
    }

    #[test]
    fn flag_keys_include_unparsed_flags() {
        let configuration = Configuration::from_json(FLAGS.as_bytes(), None).unwrap();
        let keys = configuration.flag_keys();
        assert!(keys.contains("banner"));
        assert!(keys.contains("broken"));
    }

    #[test]
    fn malformed_document_is_rejected() {
        let result = Configuration::from_json(b"{\"flags\": 42}", None);
        assert!(matches!(result, Err(Error::Json(_))));

        let result = Configuration::from_json(FLAGS.as_bytes(), Some(b"not json"));
        assert!(matches!(result, Err(Error::Json(_))));
    }
}
