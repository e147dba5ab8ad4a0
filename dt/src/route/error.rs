//! Routing error types

use std::time::Duration;
use thiserror::Error;

/// Reasons a routing strategy could not produce a path
///
/// None of these are fatal: the builder moves on to the next strategy.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("Directions provider is not configured")]
    Unconfigured,

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Response contained no decodable path geometry")]
    NoGeometry,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
