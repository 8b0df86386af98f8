//! Error types for the syhub telemetry dashboard.

use thiserror::Error;

/// The main error type for all syhub operations.
///
/// Each variant wraps the error enum of one functional area so callers can
/// either match on the area or just propagate with `?`.
#[derive(Error, Debug)]
pub enum SyhubError {
    /// Error raised by the series store (write path).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An inbound telemetry message could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A single service status probe failed.
    #[error("health check error: {0}")]
    HealthCheck(#[from] HealthCheckError),

    /// Settings could not be loaded or failed validation.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// The dashboard page could not be rendered.
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

/// Errors raised by [`SeriesStore`](crate::store::SeriesStore).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A metric key was empty.
    #[error("invalid metric key: keys must be non-empty")]
    InvalidKey,

    /// A store was requested with room for zero samples per series.
    #[error("series capacity must be at least 1")]
    ZeroCapacity,
}

/// Errors raised while decoding an inbound telemetry message.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload was not valid UTF-8.
    #[error("payload is not valid UTF-8: {source}")]
    Utf8 {
        /// The underlying UTF-8 error.
        #[source]
        source: std::str::Utf8Error,
    },

    /// The payload was not valid JSON.
    #[error("payload is not valid JSON: {source}")]
    Json {
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },

    /// The payload was valid JSON but not an object of fields.
    #[error("expected a JSON object of fields, found {found}")]
    NotAnObject {
        /// The JSON type that was found instead.
        found: &'static str,
    },
}

/// Errors raised while probing a single external service.
#[derive(Error, Debug)]
pub enum HealthCheckError {
    /// The status command could not be started.
    #[error("failed to run status command for '{service}': {source}")]
    Spawn {
        /// The service being probed.
        service: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The status command produced output that maps to no known state.
    #[error("unrecognized status '{output}' for '{service}'")]
    UnrecognizedOutput {
        /// The service being probed.
        service: String,
        /// The trimmed command output.
        output: String,
    },

    /// The HTTP health endpoint could not be reached.
    #[cfg(feature = "http-probe")]
    #[error("HTTP health check for '{service}' failed: {source}")]
    Http {
        /// The service being probed.
        service: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// Errors raised while loading or validating [`Settings`](crate::settings::Settings).
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The settings sources could not be read or deserialized.
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// The settings were readable but semantically invalid.
    #[error("invalid settings: {reason}")]
    Invalid {
        /// Description of what was invalid.
        reason: String,
    },
}

/// Errors raised by the presentation layer.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The page template failed to compile or render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// Type alias for `Result<T, SyhubError>`.
pub type Result<T> = std::result::Result<T, SyhubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts_to_top_level() {
        let err: SyhubError = StoreError::InvalidKey.into();
        assert!(matches!(err, SyhubError::Store(StoreError::InvalidKey)));
        assert_eq!(
            err.to_string(),
            "store error: invalid metric key: keys must be non-empty"
        );
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::NotAnObject { found: "array" };
        assert_eq!(
            err.to_string(),
            "expected a JSON object of fields, found array"
        );
    }

    #[test]
    fn test_settings_invalid_display() {
        let err: SyhubError = SettingsError::Invalid {
            reason: "project.name is empty".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "settings error: invalid settings: project.name is empty"
        );
    }
}
