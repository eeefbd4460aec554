use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Everything a caller of the transport can get back instead of a payload.
///
/// Clone so that one refresh outcome can be handed to every request waiting
/// on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("File error: {0}")]
    File(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build the error for a non-success response.
    ///
    /// Prefers `message` (then `error`) from a JSON body and falls back to
    /// `HTTP error <status>: <reason>`.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let extracted = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .filter(|m| !m.trim().is_empty());

        let message = match extracted {
            Some(message) => Self::truncate_body(&message),
            None => format!(
                "HTTP error {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown Status")
            ),
        };

        ApiError::Http {
            status: status.as_u16(),
            message,
        }
    }

    /// Describe a failure where no response came back at all.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "request timed out"
        } else if err.is_connect() {
            "connection failed"
        } else if err.is_builder() || err.is_request() {
            "request could not be sent"
        } else if err.is_body() {
            "body error"
        } else {
            "transport failure"
        };
        ApiError::Network(format!("{} ({})", kind, err))
    }

    /// HTTP status of the response that produced this error, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for every failure that means "you need to sign in (again)".
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthenticated
                | ApiError::SessionExpired
                | ApiError::InvalidCredentials(_)
                | ApiError::Http { status: 401, .. }
        )
    }

    /// Request and transport failures go to the notifier; auth failures are
    /// signalled through session events instead.
    pub fn is_reportable(&self) -> bool {
        matches!(self, ApiError::Http { .. } | ApiError::Network(_))
    }
}
