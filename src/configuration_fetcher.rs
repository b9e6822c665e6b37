//! Fetching configuration documents from the server.
use std::collections::HashMap;

use reqwest::{StatusCode, Url};
use serde::Deserialize;

use crate::{Error, Result};

/// Raw documents returned by a fetch. Parsing happens in
/// [`Configuration::from_server_response_bytes`](crate::Configuration::from_server_response_bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationResponse {
    /// Flag configuration document.
    pub flags: Vec<u8>,
    /// Bandit models document, if the flag document references bandits.
    pub bandits: Option<Vec<u8>>,
}

/// Source of configuration documents. The poller calls `fetch()` once per cycle and never retries
/// within a cycle.
///
/// Closures returning [`ConfigurationResponse`] implement this trait, which is convenient for
/// tests and for loading configuration from non-HTTP sources.
pub trait ConfigurationFetcher {
    #[allow(missing_docs)]
    fn fetch(&mut self) -> Result<ConfigurationResponse>;
}

impl<F: FnMut() -> Result<ConfigurationResponse>> ConfigurationFetcher for F {
    fn fetch(&mut self) -> Result<ConfigurationResponse> {
        self()
    }
}

#[allow(missing_docs)]
pub struct HttpConfigurationFetcherConfig {
    pub base_url: String,
    pub api_key: String,
    /// SDK name. Usually, language name.
    pub sdk_name: String,
    /// Version of SDK.
    pub sdk_version: String,
}

/// Default base URL of the configuration server.
pub const DEFAULT_BASE_URL: &str = "https://fscdn.eppo.cloud/api";

const UFC_ENDPOINT: &str = "/flag-config/v1/config";
const BANDIT_ENDPOINT: &str = "/flag-config/v1/bandits";

/// A fetcher that requests configuration from the server over HTTP.
pub struct HttpConfigurationFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    config: HttpConfigurationFetcherConfig,
    /// If we receive a 401 Unauthorized error during a request, it means the API key is not
    /// valid. We cache this error so we don't issue additional requests to the server.
    unauthorized: bool,
}

/// Just enough of the flag document to tell whether bandit models are needed.
#[derive(Deserialize)]
struct BanditReferences {
    #[serde(default)]
    bandits: HashMap<String, serde::de::IgnoredAny>,
}

impl HttpConfigurationFetcher {
    #[allow(missing_docs)]
    pub fn new(config: HttpConfigurationFetcherConfig) -> HttpConfigurationFetcher {
        let client = reqwest::blocking::Client::new();

        HttpConfigurationFetcher {
            client,
            config,
            unauthorized: false,
        }
    }

    fn url(&self, endpoint: &str) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}{}", self.config.base_url, endpoint),
            &[
                ("apiKey", &*self.config.api_key),
                ("sdkName", &*self.config.sdk_name),
                ("sdkVersion", &*self.config.sdk_version),
            ],
        )
        .map_err(Error::InvalidBaseUrl)
    }

    fn get(&mut self, endpoint: &str) -> Result<Vec<u8>> {
        let url = self.url(endpoint)?;

        log::debug!(target: "flagkit", endpoint; "fetching configuration");
        let response = self.client.get(url).send()?;

        let response = response.error_for_status().map_err(|err| {
            if err.status() == Some(StatusCode::UNAUTHORIZED) {
                log::warn!(target: "flagkit", "client is not authorized. Check your API key");
                self.unauthorized = true;
                Error::Unauthorized
            } else {
                log::warn!(target: "flagkit", "received non-200 response while fetching new configuration: {:?}", err);
                Error::from(err)
            }
        })?;

        Ok(response.bytes()?.to_vec())
    }
}

impl ConfigurationFetcher for HttpConfigurationFetcher {
    fn fetch(&mut self) -> Result<ConfigurationResponse> {
        if self.unauthorized {
            return Err(Error::Unauthorized);
        }

        let flags = self.get(UFC_ENDPOINT)?;

        let references = serde_json::from_slice::<BanditReferences>(&flags)?;
        let bandits = if references.bandits.is_empty() {
            None
        } else {
            Some(self.get(BANDIT_ENDPOINT)?)
        };

        log::debug!(target: "flagkit", "successfully fetched configuration");

        Ok(ConfigurationResponse { flags, bandits })
    }
}
