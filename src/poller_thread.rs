//! Background refresh of the active configuration.
use std::{
    panic::AssertUnwindSafe,
    sync::{
        mpsc::{Receiver, RecvTimeoutError},
        Arc, Condvar, Mutex, PoisonError,
    },
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::configuration_fetcher::ConfigurationFetcher;
use crate::configuration_store::ConfigurationStore;
use crate::{Configuration, Error, Result};

/// Refresh schedule of a [`PollerThread`].
#[derive(Debug, Clone)]
pub struct PollerThreadConfig {
    /// Nominal time between two fetches. Defaults to 30 seconds.
    pub interval: Duration,
    /// Upper bound of the random duration subtracted from `interval` on every cycle, so that many
    /// processes started together drift apart. Defaults to 3 seconds.
    pub jitter: Duration,
}

impl PollerThreadConfig {
    /// Default value for [`PollerThreadConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
    /// Default value for [`PollerThreadConfig::jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(3);

    /// Same as [`PollerThreadConfig::default()`].
    pub fn new() -> PollerThreadConfig {
        PollerThreadConfig::default()
    }

    /// Replace the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> PollerThreadConfig {
        self.interval = interval;
        self
    }

    /// Replace the poll jitter.
    pub fn with_jitter(mut self, jitter: Duration) -> PollerThreadConfig {
        self.jitter = jitter;
        self
    }
}

impl Default for PollerThreadConfig {
    fn default() -> PollerThreadConfig {
        PollerThreadConfig {
            interval: PollerThreadConfig::DEFAULT_POLL_INTERVAL,
            jitter: PollerThreadConfig::DEFAULT_POLL_JITTER,
        }
    }
}

/// Shared view of the poller's first-fetch result.
///
/// Holds `None` if configuration hasn't been fetched yet, `Some(Ok(()))` once a configuration has
/// been stored, and `Some(Err(...))` if the poller stopped on an unrecoverable error.
#[derive(Clone, Default)]
pub struct PollerStatus {
    inner: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl PollerStatus {
    /// Current status without blocking.
    pub fn get(&self) -> Option<Result<()>> {
        self.inner
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block until the status is known.
    pub fn wait(&self) -> Result<()> {
        let (lock, condvar) = &*self.inner;
        let mut lock = lock.lock().map_err(|_| Error::PollerThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    lock = condvar.wait(lock).map_err(|_| Error::PollerThreadPanicked)?;
                }
            }
        }
    }

    pub(crate) fn set(&self, value: Result<()>) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        condvar.notify_all();
    }
}

/// Handle to a thread that keeps a [`ConfigurationStore`] up to date.
///
/// Every cycle asks the [`ConfigurationFetcher`] for fresh documents and publishes the parsed
/// snapshot. Failed cycles are logged and retried on the next tick. `Unauthorized`, an invalid
/// base URL, or a panic inside the fetcher stop the thread and are reported through
/// [`PollerThread::status`].
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,
    stop_sender: std::sync::mpsc::SyncSender<()>,
    status: PollerStatus,
}

impl PollerThread {
    /// Spawn a poller with the default schedule.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the poller thread failed to start.
    pub fn start<F>(fetcher: F, store: Arc<ConfigurationStore>) -> std::io::Result<PollerThread>
    where
        F: ConfigurationFetcher + Send + 'static,
    {
        PollerThread::start_with_config(fetcher, store, PollerThreadConfig::default())
    }

    /// Spawn a poller with a custom schedule.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the poller thread failed to start.
    pub fn start_with_config<F>(
        mut fetcher: F,
        store: Arc<ConfigurationStore>,
        config: PollerThreadConfig,
    ) -> std::io::Result<PollerThread>
    where
        F: ConfigurationFetcher + Send + 'static,
    {
        // A one-slot sync channel makes the sender `Sync`; extra stop requests are dropped.
        let (stop_sender, stop_receiver) = std::sync::mpsc::sync_channel::<()>(1);
        let status = PollerStatus::default();

        let thread_status = status.clone();
        let join_handle = std::thread::Builder::new()
            .name("flagkit-poller".to_owned())
            .spawn(move || {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    run_poller(&mut fetcher, &store, &config, &stop_receiver, &thread_status)
                }));
                if outcome.is_err() {
                    log::warn!(target: "flagkit", "poller thread panicked");
                    thread_status.set(Err(Error::PollerThreadPanicked));
                }
            })?;

        Ok(PollerThread {
            join_handle,
            stop_sender,
            status,
        })
    }

    /// Block until the first configuration is stored or the poller gives up.
    ///
    /// # Errors
    ///
    /// - [`Error::PollerThreadPanicked`]
    /// - [`Error::Unauthorized`]
    /// - [`Error::InvalidBaseUrl`]
    ///
    /// # Example
    ///
    /// ```
    /// # fn test(poller_thread: flagkit::PollerThread) {
    /// if let Err(err) = poller_thread.wait_for_configuration() {
    ///     eprintln!("serving defaults, no configuration: {err}");
    /// }
    /// # }
    /// ```
    pub fn wait_for_configuration(&self) -> Result<()> {
        self.status.wait()
    }

    /// Shared, non-blocking view of the first-fetch result.
    pub fn status(&self) -> PollerStatus {
        self.status.clone()
    }

    /// Ask the thread to stop without waiting for it. A cycle already in flight completes first.
    pub fn stop(&self) {
        // Full buffer or a gone receiver both mean the thread is already stopping.
        let _ = self.stop_sender.try_send(());
    }

    /// [`PollerThread::stop`] and join the thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PollerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        self.join_handle
            .join()
            .map_err(|_| Error::PollerThreadPanicked)?;

        Ok(())
    }
}

/// Fetch-publish-sleep loop. Returns when stopped or on an unrecoverable error.
fn run_poller(
    fetcher: &mut impl ConfigurationFetcher,
    store: &ConfigurationStore,
    config: &PollerThreadConfig,
    stop_receiver: &Receiver<()>,
    status: &PollerStatus,
) {
    loop {
        log::debug!(target: "flagkit", "poller cycle started");
        let fetched = fetcher
            .fetch()
            .and_then(|response| Configuration::from_server_response_bytes(&response));

        match fetched {
            Ok(configuration) => {
                store.set_configuration(Arc::new(configuration));
                status.set(Ok(()));
            }
            Err(err @ (Error::Unauthorized | Error::InvalidBaseUrl(_))) => {
                log::warn!(target: "flagkit", "stopping poller: {err}");
                status.set(Err(err));
                return;
            }
            Err(err) => {
                log::warn!(target: "flagkit", "poller cycle failed, keeping current configuration: {err}");
            }
        }

        match stop_receiver.recv_timeout(jitter(config.interval, config.jitter)) {
            Err(RecvTimeoutError::Timeout) => continue,
            // A dropped handle counts as a stop request.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::debug!(target: "flagkit", "poller stopped");
                return;
            }
        }
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}

#[cfg(test)]
mod jitter_tests {
    use std::time::Duration;

    #[test]
    fn jitter_is_subtractive() {
        let interval = Duration::from_secs(30);
        let jitter = Duration::from_secs(30);

        let result = super::jitter(interval, jitter);

        assert!(result <= interval, "{result:?} must be <= {interval:?}");
    }

    #[test]
    fn jitter_truncates_to_zero() {
        let result = super::jitter(Duration::ZERO, Duration::from_secs(30));

        assert_eq!(result, Duration::ZERO);
    }

    #[test]
    fn jitter_works_with_zero_jitter() {
        let result = super::jitter(Duration::from_secs(30), Duration::ZERO);

        assert_eq!(result, Duration::from_secs(30));
    }
}
