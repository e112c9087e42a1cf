use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Structured error shared by every StudyBot layer.
///
/// `code` is a stable UPPER_SNAKE identifier callers can match on
/// (`EXTRACT_UNSUPPORTED_FORMAT`, `AI_DIMENSION_MISMATCH`, ...). `details` carries
/// the underlying error text and the paths/ids involved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    /// Filesystem failure on `path`, with the io error folded into `details`.
    pub fn io(
        code: impl Into<String>,
        message: impl Into<String>,
        path: &Path,
        err: impl fmt::Display,
    ) -> Self {
        Self::new(code, message).with_details(format!("path={}; err={}", path.display(), err))
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details.as_deref() {
            Some(d) => write!(f, "[{}] {} ({})", self.code, self.message, d),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for AppError {}
