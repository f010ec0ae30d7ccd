use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EscrowError>;

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("signature verification failed: {0}")]
    Signature(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("state conflict: task {task_id} is already {status}")]
    StateConflict { task_id: String, status: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Failures talking to the external payment gateway.
///
/// Transient conditions (rate limits, server errors, timeouts) are
/// distinguished from fatal ones so callers can retry with backoff.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway rejected {operation}: {message}")]
    Api {
        operation: String,
        message: String,
        code: Option<String>,
        http_status: Option<u16>,
    },
    #[error("gateway request {operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },
    #[error("transport error during {operation}: {message}")]
    Transport { operation: String, message: String },
}

impl GatewayError {
    /// Whether the caller may retry this failure with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Api { http_status, .. } => match http_status {
                Some(status) => *status == 429 || (500..600).contains(status),
                None => false,
            },
            GatewayError::Timeout { .. } => true,
            GatewayError::Transport { .. } => true,
        }
    }
}
