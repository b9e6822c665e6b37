//! A thread-safe in-memory storage for currently active configuration. [`ConfigurationStore`]
//! provides concurrent access for readers (e.g., flag evaluation) and writers (e.g., periodic
//! configuration fetcher).
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::Configuration;

/// `ConfigurationStore` provides a thread-safe (`Sync`) storage for configuration that allows
/// concurrent access for readers and writers.
///
/// `Configuration` itself is always immutable and can only be replaced completely. Reads never
/// block and never observe a partially installed snapshot.
#[derive(Default)]
pub struct ConfigurationStore {
    configuration: ArcSwapOption<Configuration>,
}

impl ConfigurationStore {
    /// Create a new empty configuration store.
    pub fn new() -> Self {
        ConfigurationStore::default()
    }

    /// Get currently-active configuration. Returns None if configuration hasn't been fetched/stored
    /// yet.
    pub fn get_configuration(&self) -> Option<Arc<Configuration>> {
        self.configuration.load_full()
    }

    /// Set new configuration, returning the previously active one.
    pub fn set_configuration(&self, config: Arc<Configuration>) -> Option<Arc<Configuration>> {
        self.configuration.swap(Some(config))
    }
}
