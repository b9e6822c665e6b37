use std::time::Duration;

use crate::{
    clock::{Clock, SystemClock},
    configuration_fetcher::DEFAULT_BASE_URL,
    logger::NoopAssignmentLogger,
    poller_thread::PollerThreadConfig,
    AssignmentLogger, Client,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use flagkit::ClientConfig;
/// let client = ClientConfig::from_api_key("api-key")
///     .assignment_logger(|event| {
///         println!("{:?}", event);
///     })
///     .to_client();
/// ```
pub struct ClientConfig<'a> {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) assignment_logger: Box<dyn AssignmentLogger + Send + Sync + 'a>,
    pub(crate) assignment_cache_size: Option<usize>,
    pub(crate) bandit_cache_size: Option<usize>,
    pub(crate) poller_config: PollerThreadConfig,
    pub(crate) clock: Box<dyn Clock + 'a>,
}

impl<'a> ClientConfig<'a> {
    /// Default base URL for API calls.
    pub const DEFAULT_BASE_URL: &'static str = DEFAULT_BASE_URL;

    /// Default number of entries in each deduplication cache.
    pub const DEFAULT_CACHE_SIZE: usize = 50_000;

    /// Create a default configuration using the specified API key.
    ///
    /// ```
    /// # use flagkit::ClientConfig;
    /// ClientConfig::from_api_key("api-key");
    /// ```
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        ClientConfig {
            api_key: api_key.into(),
            base_url: ClientConfig::DEFAULT_BASE_URL.to_owned(),
            assignment_logger: Box::new(NoopAssignmentLogger),
            assignment_cache_size: Some(ClientConfig::DEFAULT_CACHE_SIZE),
            bandit_cache_size: Some(ClientConfig::DEFAULT_CACHE_SIZE),
            poller_config: PollerThreadConfig::default(),
            clock: Box::new(SystemClock),
        }
    }

    /// Set assignment logger to store variation assignments to your data warehouse.
    ///
    /// To receive bandit events as well, pass a logger that implements
    /// [`BanditLogger`](crate::BanditLogger) and returns itself from
    /// [`AssignmentLogger::as_bandit_logger`].
    ///
    /// ```
    /// # use flagkit::ClientConfig;
    /// let config = ClientConfig::from_api_key("api-key").assignment_logger(|event| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn assignment_logger(
        mut self,
        assignment_logger: impl AssignmentLogger + Send + Sync + 'a,
    ) -> Self {
        self.assignment_logger = Box::new(assignment_logger);
        self
    }

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Maximum number of `(flag, subject)` entries remembered to suppress duplicate assignment
    /// events. `None` disables deduplication.
    pub fn assignment_cache_size(mut self, size: Option<usize>) -> Self {
        self.assignment_cache_size = size;
        self
    }

    /// Maximum number of `(flag, subject)` entries remembered to suppress duplicate bandit
    /// events. `None` disables deduplication.
    pub fn bandit_cache_size(mut self, size: Option<usize>) -> Self {
        self.bandit_cache_size = size;
        self
    }

    /// Interval between configuration fetches.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poller_config = self.poller_config.with_interval(interval);
        self
    }

    /// Maximum random duration subtracted from the poll interval on each cycle.
    pub fn poll_jitter(mut self, jitter: Duration) -> Self {
        self.poller_config = self.poller_config.with_jitter(jitter);
        self
    }

    /// Source of the current time for allocation windows and event timestamps.
    pub fn clock(mut self, clock: impl Clock + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # use flagkit::{ClientConfig, Client};
    /// let client: Client = ClientConfig::from_api_key("api-key").to_client();
    /// ```
    pub fn to_client(self) -> Client<'a> {
        Client::new(self)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ClientConfig;

    #[test]
    fn defaults() {
        let config = ClientConfig::from_api_key("api-key");
        assert_eq!(config.base_url, "https://fscdn.eppo.cloud/api");
        assert_eq!(config.assignment_cache_size, Some(50_000));
        assert_eq!(config.bandit_cache_size, Some(50_000));
        assert_eq!(config.poller_config.interval, Duration::from_secs(30));
        assert_eq!(config.poller_config.jitter, Duration::from_secs(3));
    }

    #[test]
    fn setters_override_defaults() {
        let config = ClientConfig::from_api_key("api-key")
            .base_url("http://localhost:8080/api")
            .assignment_cache_size(None)
            .bandit_cache_size(Some(10))
            .poll_interval(Duration::from_secs(5))
            .poll_jitter(Duration::ZERO);
        assert_eq!(config.base_url, "http://localhost:8080/api");
        assert_eq!(config.assignment_cache_size, None);
        assert_eq!(config.bandit_cache_size, Some(10));
        assert_eq!(config.poller_config.interval, Duration::from_secs(5));
        assert_eq!(config.poller_config.jitter, Duration::ZERO);
    }
}
