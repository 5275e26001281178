//! Typed errors for the external services the dashboard talks to.

use thiserror::Error;

/// Failure talking to the agent, market-data or forecast service.
///
/// Every variant is recoverable; the chat session turns any of them into a
/// fallback message.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection refused, timeout, or any other transport-level failure.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status with no usable error body.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with an explicit `error` field.
    #[error("{0}")]
    Server(String),

    /// The response body was not the JSON shape we expect.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The task running the request panicked or was cancelled.
    #[error("request aborted: {0}")]
    Aborted(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
