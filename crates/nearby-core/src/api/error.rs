use serde::Deserialize;
use thiserror::Error;

use crate::api::transport::HttpResponse;
use crate::auth::StorageError;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Classified failure for an outbound API call.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No usable response was received. Never auto-retried by the pipeline;
    /// retry policy for transient failures belongs to the caller.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status other than a
    /// recoverable 401. The server-provided message is surfaced verbatim
    /// when the body carries one.
    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// Terminal auth failure after recovery attempts were exhausted. The
    /// session has already been cleared when this is returned.
    #[error("session expired - please log in again")]
    SessionExpired,

    /// OTP verification failed. Leaves any existing session untouched.
    #[error("invalid verification code: {0}")]
    InvalidOtp(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A 2xx response whose body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A stored credential contains bytes that cannot travel in an HTTP
    /// header. The request is never dispatched.
    #[error("credential not header-safe: {0}")]
    InvalidCredential(String),

    /// Caller aborted the request. Not a failure of the session.
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    /// Classify a non-success response, preferring the server's own message.
    pub(crate) fn from_response(response: &HttpResponse) -> Self {
        ApiError::ServerRejected {
            status: response.status.as_u16(),
            message: server_message(&response.body),
        }
    }
}

/// Extract a human-readable message from an error body: the backend sends
/// `{"message": ...}` or `{"error": ...}`; anything else falls back to the
/// (truncated) raw body.
pub(crate) fn server_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = parsed.message.or(parsed.error) {
            return message;
        }
    }
    truncate_body(body)
}

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.is_empty() {
        return "no response body".to_string();
    }
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..MAX_ERROR_BODY_LENGTH],
            body.len()
        )
    }
}
