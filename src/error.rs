//! Stable error codes shared by service errors and the HTTP layer.
//!
//! Every service error implements [`ErrorCode`] so transport code can build a
//! uniform `{ code, message, retryable }` body without matching on concrete
//! error types.

use serde::Serialize;

/// Machine-readable classification for a displayable error.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// Wire shape of an error response.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ErrorBody {
    /// Build a body from any [`ErrorCode`], using its `Display` text as the message.
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self { code: err.error_code().to_owned(), message: err.to_string(), retryable: err.retryable() }
    }

    /// Build a body with a caller-supplied message, hiding the error's own text.
    pub fn masked(err: &(impl ErrorCode + ?Sized), message: &str) -> Self {
        Self { code: err.error_code().to_owned(), message: message.to_owned(), retryable: err.retryable() }
    }
}
