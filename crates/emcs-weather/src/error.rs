//! Location and forecast error types.

use emcs_core::{AppError, NetworkError, ReqwestErrorExt, StorageError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Location storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    #[error("Network unavailable: {0}")]
    NetworkUnavailable(NetworkError),

    #[error("Request timed out")]
    Timeout,

    #[error("City not found: {0}")]
    NotFound(String),

    #[error("No forecast has been published yet")]
    NoForecast,

    #[error("Malformed {kind} entry: {reason}")]
    MalformedEntry { kind: &'static str, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl WeatherError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedEntry {
            kind,
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::StorageUnavailable(e) => e.user_message().to_string(),
            Self::NetworkUnavailable(e) => e.user_message().to_string(),
            Self::Timeout => "The weather service took too long to answer.".to_string(),
            Self::NotFound(query) => format!("City '{}' could not be found.", query),
            Self::NoForecast => "No forecast has been loaded yet.".to_string(),
            Self::MalformedEntry { .. } => "Some forecast entries were unreadable.".to_string(),
            Self::InvalidArgument(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// Whether the caller can keep going with last known good state or a default.
    ///
    /// Only programmer errors are not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidArgument(_))
    }
}

impl From<NetworkError> for WeatherError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::Timeout => Self::Timeout,
            other => Self::NetworkUnavailable(other),
        }
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(err: reqwest::Error) -> Self {
        err.into_network_error().into()
    }
}

impl From<tokio::time::error::Elapsed> for WeatherError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

impl From<WeatherError> for AppError {
    fn from(err: WeatherError) -> Self {
        match err {
            WeatherError::StorageUnavailable(e) => AppError::Storage(e),
            WeatherError::NetworkUnavailable(e) => AppError::Network(e),
            WeatherError::Timeout => AppError::Network(NetworkError::Timeout),
            other => AppError::Weather(other.to_string()),
        }
    }
}
