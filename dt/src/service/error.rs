//! Planning service error types

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur talking to the planning/assistant service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Decodable JSON that matches none of the expected shapes
    #[error("Unrecognized response shape: {0}")]
    Malformed(String),

    #[error("Planning service is disabled")]
    Disabled,
}

impl ServiceError {
    /// Whether the request never produced a usable HTTP answer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Disabled)
    }

    /// Map a reqwest failure, separating timeouts
    pub(crate) fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Network(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_transport() {
        assert!(ServiceError::Timeout(Duration::from_secs(40)).is_transport());
        assert!(ServiceError::Disabled.is_transport());
        assert!(
            !ServiceError::ApiError {
                status: 500,
                message: "boom".to_string()
            }
            .is_transport()
        );
        assert!(!ServiceError::Malformed("mode=maybe".to_string()).is_transport());
    }

    #[test]
    fn test_display() {
        let err = ServiceError::ApiError {
            status: 422,
            message: "date required".to_string(),
        };
        assert_eq!(err.to_string(), "API error 422: date required");
    }
}
