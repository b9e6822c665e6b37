use std::{collections::HashMap, sync::Arc};

use crate::{
    clock::Clock,
    configuration_fetcher::{HttpConfigurationFetcher, HttpConfigurationFetcherConfig},
    eval::{self, BanditResult},
    events::{AssignmentEvent, BanditEvent},
    logger::{AssignmentLogger, BanditLogger, DeduplicatingLogger, LoggerError},
    poller_thread::{PollerStatus, PollerThread, PollerThreadConfig},
    ufc::{Assignment, AssignmentValue, VariationType},
    Attributes, ClientConfig, Configuration, ConfigurationStore, ContextAttributes, Error, Result,
};

/// Value returned by the typed accessors: either the evaluated value, or the caller's default
/// together with the reason the default was used.
#[derive(Debug, Clone)]
pub struct Evaluated<T> {
    /// Assigned value, or the caller's default if `error` is set.
    pub value: T,
    /// Why the default was returned.
    pub error: Option<Error>,
}

impl<T> Evaluated<T> {
    fn assigned(value: T) -> Self {
        Evaluated { value, error: None }
    }

    fn fallback(value: T, error: Error) -> Self {
        Evaluated {
            value,
            error: Some(error),
        }
    }
}

// `DeduplicatingLogger` needs a sized sink.
struct BoxedLogger<'a>(Box<dyn AssignmentLogger + Send + Sync + 'a>);

impl AssignmentLogger for BoxedLogger<'_> {
    fn log_assignment(&self, event: AssignmentEvent) -> std::result::Result<(), LoggerError> {
        self.0.log_assignment(event)
    }

    fn as_bandit_logger(&self) -> Option<&dyn BanditLogger> {
        self.0.as_bandit_logger()
    }
}

/// A client for evaluating flags and bandits.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// # Poller Thread
///
/// Before calling `Client::get_assignment()`, you should start the poller thread by calling
/// [`Client::start_poller_thread()`], ensuring that the configuration is fetched. It's also
/// recommended to call [`PollerThread::wait_for_configuration`] before calling `get_assignment()`.
///
/// Alternatively, a configuration obtained elsewhere can be installed with
/// [`Client::set_configuration()`].
///
/// # Examples
/// ```no_run
/// # use flagkit::{Client, ClientConfig};
/// let mut client = Client::new(ClientConfig::from_api_key("api-key"));
/// client.start_poller_thread();
/// ```
pub struct Client<'a> {
    configuration_store: Arc<ConfigurationStore>,
    api_key: String,
    base_url: String,
    poller_config: PollerThreadConfig,
    clock: Box<dyn Clock + 'a>,
    logger: DeduplicatingLogger<BoxedLogger<'a>>,
    poller_status: Option<PollerStatus>,
}

impl<'a> Client<'a> {
    /// Create a new `Client` using the specified configuration.
    ///
    /// ```
    /// # use flagkit::{ClientConfig, Client};
    /// let client = Client::new(ClientConfig::from_api_key("api-key"));
    /// ```
    pub fn new(config: ClientConfig<'a>) -> Self {
        Client::new_with_configuration_store(config, Arc::new(ConfigurationStore::new()))
    }

    /// Create a new `Client` that reads configuration from an existing store.
    pub fn new_with_configuration_store(
        config: ClientConfig<'a>,
        configuration_store: Arc<ConfigurationStore>,
    ) -> Self {
        let ClientConfig {
            api_key,
            base_url,
            assignment_logger,
            assignment_cache_size,
            bandit_cache_size,
            poller_config,
            clock,
        } = config;

        Client {
            configuration_store,
            api_key,
            base_url,
            poller_config,
            clock,
            logger: DeduplicatingLogger::new(
                BoxedLogger(assignment_logger),
                assignment_cache_size,
                bandit_cache_size,
            ),
            poller_status: None,
        }
    }

    /// Install a configuration directly, e.g. one bundled with the application or loaded from a
    /// file. Replaces whatever configuration is currently active.
    pub fn set_configuration(&self, configuration: Configuration) {
        self.configuration_store
            .set_configuration(Arc::new(configuration));
    }

    /// Currently active configuration, if any.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        self.configuration_store.get_configuration()
    }

    /// Get the assignment value for a given feature flag and subject.
    ///
    /// If the subject is not eligible for any allocation, the flag is missing or disabled, or the
    /// configuration has not been fetched yet, returns `Ok(None)`.
    ///
    /// # Typed versions
    ///
    /// There are typed versions of this function:
    /// - [`Client::get_string_assignment()`]
    /// - [`Client::get_integer_assignment()`]
    /// - [`Client::get_numeric_assignment()`]
    /// - [`Client::get_boolean_assignment()`]
    /// - [`Client::get_json_assignment()`]
    ///
    /// It is recommended to use typed versions of this function as they provide additional type
    /// safety. They can catch type errors even _before_ evaluating the assignment, which helps to
    /// detect errors if subject is not eligible for the flag allocation.
    ///
    /// # Errors
    ///
    /// Returns an error in the following cases:
    /// - [`Error::Unauthorized`] if the poller was rejected by the server.
    /// - [`Error::ConfigurationParseError`] or [`Error::ConfigurationIntegrity`] if the
    ///   configuration received from the server is invalid.
    /// - [`Error::InvalidArgument`] if the flag or subject key is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// # fn test(client: &flagkit::Client) {
    /// let assignment = client
    ///     .get_assignment(
    ///         "a-boolean-flag",
    ///         "user-id",
    ///         &[("age".to_owned(), 42.0.into())]
    ///             .into_iter()
    ///             .collect(),
    ///     )
    ///     .unwrap_or_default()
    ///     .and_then(|x| x.as_boolean())
    ///     // default assignment
    ///     .unwrap_or(false);
    /// # }
    /// ```
    pub fn get_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
    ) -> Result<Option<AssignmentValue>> {
        self.check_authorized()?;
        match self.evaluate(flag_key, subject_key, subject_attributes, None) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_normal() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Retrieves the assignment value for a given feature flag and subject as a string.
    ///
    /// Returns `default` together with the reason if the flag could not be evaluated for the
    /// subject.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the poller was rejected by the server. All other
    /// problems are reported through [`Evaluated::error`].
    ///
    /// # Examples
    ///
    /// ```
    /// # fn test(client: &flagkit::Client) {
    /// let assignment = client
    ///     .get_string_assignment("a-string-flag", "user-id", &[
    ///         ("language".into(), "en".into())
    ///     ].into_iter().collect(), "default_value".to_owned())
    ///     .map(|evaluated| evaluated.value)
    ///     .unwrap_or_else(|_| "default_value".to_owned());
    /// # }
    /// ```
    pub fn get_string_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: String,
    ) -> Result<Evaluated<String>> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::String,
            default,
            AssignmentValue::into_string,
        )
    }

    /// Retrieves the assignment value for a given feature flag and subject as an integer value.
    ///
    /// See [`Client::get_string_assignment()`] for error handling.
    pub fn get_integer_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: i64,
    ) -> Result<Evaluated<i64>> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Integer,
            default,
            |x| x.as_integer(),
        )
    }

    /// Retrieves the assignment value for a given feature flag and subject as a numeric value.
    ///
    /// See [`Client::get_string_assignment()`] for error handling.
    pub fn get_numeric_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: f64,
    ) -> Result<Evaluated<f64>> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Numeric,
            default,
            |x| x.as_numeric(),
        )
    }

    /// Retrieves the assignment value for a given feature flag and subject as a boolean value.
    ///
    /// See [`Client::get_string_assignment()`] for error handling.
    ///
    /// ```
    /// # fn test(client: &flagkit::Client) {
    /// let enabled = client
    ///     .get_boolean_assignment("a-bool-flag", "user-id", &Default::default(), false)
    ///     .map(|evaluated| evaluated.value)
    ///     .unwrap_or(false);
    /// # }
    /// ```
    pub fn get_boolean_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: bool,
    ) -> Result<Evaluated<bool>> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Boolean,
            default,
            |x| x.as_boolean(),
        )
    }

    /// Retrieves the assignment value for a given feature flag and subject as a JSON value.
    ///
    /// See [`Client::get_string_assignment()`] for error handling.
    pub fn get_json_assignment(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        default: serde_json::Value,
    ) -> Result<Evaluated<serde_json::Value>> {
        self.get_assignment_inner(
            flag_key,
            subject_key,
            subject_attributes,
            VariationType::Json,
            default,
            AssignmentValue::into_json,
        )
    }

    /// Evaluate a string flag and, if the assigned variation is backed by a bandit, select one of
    /// the supplied `actions` for the subject.
    ///
    /// The returned [`BanditResult`] always holds a usable variation (`default_variation` when the
    /// flag cannot be evaluated). Assignment and bandit events are forwarded to the configured
    /// logger.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the poller was rejected by the server. All other
    /// problems are reported through [`BanditResult::error`].
    pub fn get_bandit_action(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &ContextAttributes,
        actions: &HashMap<String, ContextAttributes>,
        default_variation: &str,
    ) -> Result<BanditResult> {
        self.check_authorized()?;

        let configuration = self.configuration_store.get_configuration();
        let result = eval::get_bandit_action(
            configuration.as_deref(),
            flag_key,
            subject_key,
            subject_attributes,
            actions,
            default_variation,
            self.clock.now(),
        );

        if let Some(event) = result.assignment_event.clone() {
            self.log_assignment(event);
        }
        if let Some(event) = result.bandit_event.clone() {
            self.log_bandit_action(event);
        }

        Ok(result)
    }

    /// Start a poller thread to fetch configuration from the server.
    pub fn start_poller_thread(&mut self) -> Result<PollerThread> {
        let fetcher = HttpConfigurationFetcher::new(HttpConfigurationFetcherConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            sdk_name: "rust".to_owned(),
            sdk_version: env!("CARGO_PKG_VERSION").to_owned(),
        });

        let poller = PollerThread::start_with_config(
            fetcher,
            self.configuration_store.clone(),
            self.poller_config.clone(),
        )?;
        self.poller_status = Some(poller.status());
        Ok(poller)
    }

    fn check_authorized(&self) -> Result<()> {
        match self.poller_status.as_ref().and_then(PollerStatus::get) {
            Some(Err(Error::Unauthorized)) => Err(Error::Unauthorized),
            _ => Ok(()),
        }
    }

    fn get_assignment_inner<T>(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: VariationType,
        default: T,
        convert: impl FnOnce(AssignmentValue) -> Option<T>,
    ) -> Result<Evaluated<T>> {
        self.check_authorized()?;

        let result = self.evaluate(flag_key, subject_key, subject_attributes, Some(expected_type));
        let value = match result {
            Ok(value) => value,
            Err(err) => return Ok(Evaluated::fallback(default, err)),
        };

        let found = value.variation_type();
        Ok(match convert(value) {
            Some(value) => Evaluated::assigned(value),
            // Type is checked during evaluation, so this only guards against a broken invariant.
            None => Evaluated::fallback(
                default,
                Error::TypeMismatch {
                    expected: expected_type,
                    found,
                },
            ),
        })
    }

    fn evaluate(
        &self,
        flag_key: &str,
        subject_key: &str,
        subject_attributes: &Attributes,
        expected_type: Option<VariationType>,
    ) -> Result<AssignmentValue> {
        let configuration = self.configuration_store.get_configuration();
        let Assignment { value, event } = eval::get_assignment(
            configuration.as_deref(),
            flag_key,
            subject_key,
            subject_attributes,
            expected_type,
            self.clock.now(),
        )?;

        if let Some(event) = event {
            self.log_assignment(event);
        }

        Ok(value)
    }

    fn log_assignment(&self, event: AssignmentEvent) {
        log::trace!(target: "flagkit",
                    event:serde;
                    "logging assignment");
        if let Err(err) = self.logger.log_assignment(event) {
            log::warn!(target: "flagkit", "failed to log assignment: {err}");
        }
    }

    fn log_bandit_action(&self, event: BanditEvent) {
        log::trace!(target: "flagkit",
                    event:serde;
                    "logging bandit action");
        if let Err(err) = self.logger.log_bandit_action(event) {
            log::warn!(target: "flagkit", "failed to log bandit action: {err}");
        }
    }
}
