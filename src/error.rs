use std::sync::Arc;

use crate::ufc::VariationType;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by flag evaluation, configuration loading, and the poller.
///
/// Evaluation errors are informational: the typed accessors on [`Client`](crate::Client) still
/// hand back the caller's default value alongside them. Only [`Error::Unauthorized`] is treated as
/// a hard failure (see [`Error::is_fatal`]).
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// Configuration has not been fetched yet.
    #[error("configuration missing")]
    ConfigurationMissing,

    /// The requested flag does not exist in the active configuration.
    #[error("flag not found")]
    FlagNotFound,

    /// Flag exists but is disabled.
    #[error("flag is disabled")]
    FlagDisabled,

    /// Subject did not match any allocation (excluded by rules, time window, or traffic split).
    #[error("no allocation matched")]
    NoAllocation,

    /// The accessor used does not match the flag's declared variation type.
    #[error("invalid flag type (expected: {expected:?}, found: {found:?})")]
    TypeMismatch {
        /// Type requested by the caller.
        expected: VariationType,
        /// Type declared by the flag.
        found: VariationType,
    },

    /// The variation payload cannot be represented as the flag's declared type (e.g., a fractional
    /// number in an integer flag or malformed JSON).
    #[error("variation value is not a valid {variation_type:?}")]
    InvalidVariationValue {
        /// Declared type of the flag.
        variation_type: VariationType,
    },

    /// Part of the configuration failed to parse. Usually means the server sent a newer format.
    #[error("error parsing configuration")]
    ConfigurationParseError,

    /// Configuration is internally inconsistent (e.g., a split references a variation that does
    /// not exist, or a flag points to a bandit with no model).
    #[error("configuration integrity error")]
    ConfigurationIntegrity,

    /// Bandit evaluation was requested with an empty set of actions.
    #[error("no actions supplied for bandit evaluation")]
    NoActionsSupplied,

    /// Caller passed an unusable argument (e.g., empty flag or subject key).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The request was unauthorized, the API key is likely invalid.
    #[error("unauthorized, api_key is likely invalid")]
    Unauthorized,

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Configuration document is not valid JSON or does not have the expected shape.
    #[error("malformed configuration document")]
    Json(#[source] Arc<serde_json::Error>),

    /// Indicates that the poller thread panicked.
    #[error("poller thread panicked")]
    PollerThreadPanicked,
}

impl Error {
    /// Return `true` if the error is a normal running condition and the default value should be
    /// returned silently.
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            Error::ConfigurationMissing
                | Error::FlagNotFound
                | Error::FlagDisabled
                | Error::NoAllocation
        )
    }

    /// Return `true` if the error must be surfaced to the caller instead of falling back to the
    /// default value.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Unauthorized)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(Arc::new(value))
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn only_unauthorized_is_fatal() {
        assert!(Error::Unauthorized.is_fatal());
        assert!(!Error::FlagNotFound.is_fatal());
        assert!(!Error::ConfigurationIntegrity.is_fatal());
        assert!(!Error::InvalidArgument("flag_key").is_fatal());
    }

    #[test]
    fn exclusion_errors_are_normal() {
        assert!(Error::NoAllocation.is_normal());
        assert!(Error::FlagDisabled.is_normal());
        assert!(!Error::ConfigurationParseError.is_normal());
        assert!(!Error::Unauthorized.is_normal());
    }
}
