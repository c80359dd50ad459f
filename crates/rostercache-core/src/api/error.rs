use thiserror::Error;

use crate::fetch::FetchError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    /// Not found, rate limited or a server-side failure. Worth asking again
    /// later, so these all surface as transient.
    #[error("Roster unavailable ({0}): {1}")]
    Unavailable(reqwest::StatusCode, String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

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

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 | 429 | 500..=599 => ApiError::Unavailable(status, truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::AccessDenied(_) | ApiError::Unauthorized => {
                FetchError::PermissionDenied(err.to_string())
            }
            ApiError::InvalidResponse(_) => FetchError::InvalidResponse(err.to_string()),
            ApiError::NetworkError(ref e) if e.is_decode() => {
                FetchError::InvalidResponse(err.to_string())
            }
            ApiError::Unavailable(..) | ApiError::NetworkError(_) => {
                FetchError::Transient(err.to_string())
            }
        }
    }
}
