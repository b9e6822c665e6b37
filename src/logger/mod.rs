//! Telemetry sinks for assignment and bandit events.
mod cache;
mod dedup;

pub use dedup::DeduplicatingLogger;

use crate::events::{AssignmentEvent, BanditEvent};

/// Error returned by a telemetry sink.
pub type LoggerError = Box<dyn std::error::Error + Send + Sync>;

/// A trait for logging assignment events to your storage system. Implementations should handle
/// persisting assignment events for analytics and tracking purposes.
///
/// Sinks that also want bandit events implement [`BanditLogger`] and return `Some(self)` from
/// [`AssignmentLogger::as_bandit_logger`].
pub trait AssignmentLogger {
    /// Logs the assignment event to the storage system.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use flagkit::{AssignmentEvent, AssignmentLogger, LoggerError};
    /// struct MyAssignmentLogger;
    ///
    /// impl AssignmentLogger for MyAssignmentLogger {
    ///     fn log_assignment(&self, event: AssignmentEvent) -> Result<(), LoggerError> {
    ///         // Implement assignment logging logic here
    ///         Ok(())
    ///     }
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returned errors (and panics) are caught by the client, logged, and discarded. The event
    /// will be offered again the next time the same subject is evaluated.
    ///
    /// # Notes
    ///
    /// This method is called before returning assignment to the caller, so it is important that
    /// `log_assignment` does not block the calling thread to prevent performance implications and
    /// delays in returning assignments.
    fn log_assignment(&self, event: AssignmentEvent) -> Result<(), LoggerError>;

    /// Returns the bandit-capable view of this sink, if it has one.
    fn as_bandit_logger(&self) -> Option<&dyn BanditLogger> {
        None
    }
}

/// A sink that accepts bandit action events in addition to assignment events.
///
/// ```no_run
/// # use flagkit::{AssignmentEvent, AssignmentLogger, BanditEvent, BanditLogger, LoggerError};
/// struct MyLogger;
///
/// impl AssignmentLogger for MyLogger {
///     fn log_assignment(&self, event: AssignmentEvent) -> Result<(), LoggerError> {
///         Ok(())
///     }
///
///     fn as_bandit_logger(&self) -> Option<&dyn BanditLogger> {
///         Some(self)
///     }
/// }
///
/// impl BanditLogger for MyLogger {
///     fn log_bandit_action(&self, event: BanditEvent) -> Result<(), LoggerError> {
///         Ok(())
///     }
/// }
/// ```
pub trait BanditLogger: AssignmentLogger {
    /// Logs the bandit action event to the storage system.
    fn log_bandit_action(&self, event: BanditEvent) -> Result<(), LoggerError>;
}

pub(crate) struct NoopAssignmentLogger;
impl AssignmentLogger for NoopAssignmentLogger {
    fn log_assignment(&self, _event: AssignmentEvent) -> Result<(), LoggerError> {
        Ok(())
    }
}

impl<T: Fn(AssignmentEvent)> AssignmentLogger for T {
    fn log_assignment(&self, event: AssignmentEvent) -> Result<(), LoggerError> {
        self(event);
        Ok(())
    }
}
