//! Error types for provider operations.
//!
//! Errors are categorized to enable retry decisions and appropriate
//! caller feedback. The categories follow the transport contract every
//! provider handler is expected to honor: network failures, `429` and
//! `5xx` are transient, every other `4xx` is surfaced verbatim.

use thiserror::Error;

/// Categories of provider errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-level failure, no HTTP status was received
    Network,
    /// The provider throttled the request (HTTP 429)
    RateLimited,
    /// The provider failed internally (HTTP 5xx)
    Server,
    /// The remote object does not exist (HTTP 404)
    NotFound,
    /// The remote object already exists (HTTP 409 or a name collision)
    Conflict,
    /// Any other client-side rejection (remaining 4xx)
    Client,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::Server)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::RateLimited => "Request throttled by provider",
            Self::Server => "Provider internal error",
            Self::NotFound => "Remote object not found",
            Self::Conflict => "Remote object already exists",
            Self::Client => "Request rejected by provider",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check connectivity to the provider and try again",
            Self::RateLimited => "Reduce concurrency or raise the retry budget",
            Self::Server => "The provider is degraded; retry later",
            Self::NotFound => "Verify the object name or re-create it",
            Self::Conflict => "Adopt the existing object or choose another name",
            Self::Client => "Fix the request parameters; retrying will not help",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while talking to a provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Network-related error (connection, timeout, DNS, etc.)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message from the failed network operation
        message: String,
    },

    /// The provider answered with a non-success HTTP status
    #[error("provider returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or provider message, verbatim
        message: String,
    },

    /// Remote object not found
    #[error("not found: {name}")]
    NotFound {
        /// Name of the object that could not be found
        name: String,
    },

    /// Remote object already exists
    #[error("conflict: {name} already exists")]
    Conflict {
        /// Physical name of the conflicting object
        name: String,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from an HTTP status and response body.
    ///
    /// `404` and `409` map onto the dedicated variants so callers can
    /// match on them without inspecting status codes.
    pub fn from_status(status: u16, message: impl Into<String>, name: Option<&str>) -> Self {
        let message = message.into();
        match status {
            404 => Error::NotFound {
                name: name.map(str::to_string).unwrap_or(message),
            },
            409 => Error::Conflict {
                name: name.map(str::to_string).unwrap_or(message),
            },
            _ => Error::Status { status, message },
        }
    }

    /// HTTP status associated with this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            Error::NotFound { .. } => Some(404),
            Error::Conflict { .. } => Some(409),
            Error::Network { .. } | Error::Other(_) => None,
        }
    }

    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network { .. } => ErrorCategory::Network,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Conflict { .. } => ErrorCategory::Conflict,
            Error::Status { status: 429, .. } => ErrorCategory::RateLimited,
            Error::Status { status, .. } if *status >= 500 => ErrorCategory::Server,
            Error::Status { status, .. } if *status >= 400 => ErrorCategory::Client,
            Error::Status { .. } | Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Classify a transport failure by its HTTP status.
///
/// `None` means no status was received at all (network failure).
pub fn is_retryable_status(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(429) => true,
        Some(s) => (500..600).contains(&s),
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, Error>;
