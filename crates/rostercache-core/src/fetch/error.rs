use thiserror::Error;

/// Why a page fetch did not produce a page.
///
/// `Clone` because one result is handed to every caller sharing a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request was abandoned. Not an application error.
    #[error("Request cancelled")]
    Cancelled,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Temporary failure: {0}")]
    Transient(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, FetchError::PermissionDenied(_))
    }

    /// Short message fit for showing in place of the roster.
    pub fn user_message(&self) -> &'static str {
        match self {
            FetchError::Cancelled => "Request cancelled",
            FetchError::PermissionDenied(_) => "You don't have permission to view this roster",
            FetchError::Transient(_) => "Couldn't load members. Please try again.",
            FetchError::InvalidResponse(_) => "The server sent an unexpected response",
        }
    }
}
