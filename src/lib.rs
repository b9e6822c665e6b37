//! An embedded feature flag and contextual bandit decision engine.
//!
//! # Overview
//!
//! The crate revolves around a [`Client`] that evaluates feature flag values for `subjects`, where
//! each subject has a unique key and key-value attributes associated with it. Feature flag
//! evaluation results in an [`AssignmentValue`] being returned, representing a specific feature
//! flag value assigned to the subject.
//!
//! Flags whose variation is backed by a contextual bandit can additionally select one of a set of
//! candidate actions for the subject with [`Client::get_bandit_action`].
//!
//! An [`AssignmentLogger`] should be provided to save assignment events to your storage,
//! facilitating tracking of which user received which feature flag values. Loggers that also
//! implement [`BanditLogger`] receive bandit action events. Repeated events for the same subject
//! are suppressed by a [`DeduplicatingLogger`].
//!
//! # Configuration
//!
//! Configuration is either fetched periodically by a [`PollerThread`] (see
//! [`Client::start_poller_thread`]), or installed directly with [`Client::set_configuration`].
//! Readers always observe one complete configuration snapshot.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! The typed accessors always hand back a usable value and report why the default was used
//! alongside it. Only [`Error::Unauthorized`] is returned as a hard error. In production, it is
//! recommended to ignore the reported errors, as feature flag evaluation should not be critical
//! enough to cause system crashes. However, they are valuable for debugging and usually indicate
//! that developer's attention is needed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `flagkit` target. Consider integrating a `log`-compatible logger implementation for better
//! visibility into library operations.
//!
//! # Examples
//!
//! ```no_run
//! use flagkit::{Attributes, ClientConfig};
//!
//! let mut client = ClientConfig::from_api_key("api-key")
//!     .assignment_logger(|event| println!("{event:?}"))
//!     .to_client();
//!
//! let poller = client.start_poller_thread().unwrap();
//! poller.wait_for_configuration().unwrap();
//!
//! let enabled = client
//!     .get_boolean_assignment("new-checkout", "user-1", &Attributes::new(), false)
//!     .map(|evaluated| evaluated.value)
//!     .unwrap_or(false);
//! ```
//!
//! A runnable example lives in `demos/simple`.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod attributes;
pub mod bandits;
mod client;
mod clock;
mod config;
mod configuration;
mod configuration_fetcher;
mod configuration_store;
mod error;
mod eval;
mod events;
mod logger;
mod poller_thread;
mod sharder;
pub mod ufc;

pub use attributes::{AttributeValue, Attributes, ContextAttributes};
pub use bandits::BanditEvaluation;
pub use client::{Client, Evaluated};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::ClientConfig;
pub use configuration::Configuration;
pub use configuration_fetcher::{
    ConfigurationFetcher, ConfigurationResponse, HttpConfigurationFetcher,
    HttpConfigurationFetcherConfig,
};
pub use configuration_store::ConfigurationStore;
pub use error::{Error, Result};
pub use eval::BanditResult;
pub use events::{AssignmentEvent, BanditEvent};
pub use logger::{AssignmentLogger, BanditLogger, DeduplicatingLogger, LoggerError};
pub use poller_thread::{PollerStatus, PollerThread, PollerThreadConfig};
pub use ufc::{AssignmentValue, VariationType};
