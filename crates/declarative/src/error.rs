//! Error types for the reconciliation engine.
//!
//! The engine never swallows handler errors. Every variant is `Clone` so
//! that a failure settled inside a shared pending value can be reported to
//! each resource that depends on it.

use crate::types::Phase;
use providerkit::ErrorCategory;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A single failure collected during a teardown sweep.
#[derive(Debug, Clone)]
pub struct DestroyFailure {
    /// Key of the scope the resource belongs to
    pub scope: String,
    /// Identity of the resource within its scope
    pub identity: String,
    /// Why the resource could not be destroyed
    pub error: Error,
}

impl fmt::Display for DestroyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.scope, self.identity, self.error)
    }
}

/// Errors surfaced by `apply`, `destroy_instance` and the teardown sweep.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A create targeted a physical name that already exists remotely and
    /// adoption was not requested
    #[error("conflict: {name} already exists")]
    Conflict {
        /// Physical name of the pre-existing object
        name: String,
    },

    /// A remote object expected to exist is missing
    #[error("not found: {name}")]
    NotFound {
        /// Physical name that was looked up
        name: String,
    },

    /// A provider call failed after the retry policy gave up, or with a
    /// non-retryable classification
    #[error(transparent)]
    Provider(#[from] providerkit::Error),

    /// A `depends_on` input failed; the dependent handler never ran
    #[error("dependency of {identity} failed: {source}")]
    Dependency {
        /// Identity of the resource that was waiting
        identity: String,
        /// The dependency's own error, unchanged
        source: Box<Error>,
    },

    /// One or more resources failed their delete phase during a sweep
    #[error(
        "destroy failed for {} resource(s): {}",
        .failures.len(),
        .failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    )]
    DestroySweep {
        /// Every failure, in the order the sweep met them
        failures: Vec<DestroyFailure>,
    },

    /// A resource was kept because something depending on it failed to delete
    #[error("{identity} was kept because {blocked_by} still depends on it")]
    DestroyBlocked {
        /// Resource that was skipped
        identity: String,
        /// Dependent whose deletion failed
        blocked_by: String,
    },

    /// `replace()` was signalled while creating
    #[error("{identity}: replace() is not allowed during create")]
    ReplaceDuringCreate {
        /// Identity of the resource
        identity: String,
    },

    /// The handler's outcome does not fit the phase it was invoked in
    #[error("{identity}: handler returned {outcome} during {phase}")]
    UnexpectedOutcome {
        /// Identity of the resource
        identity: String,
        /// Phase the handler was invoked in
        phase: Phase,
        /// Name of the returned outcome
        outcome: &'static str,
    },

    /// An identity was declared twice in one scope with different types
    #[error("{identity} is already declared in scope {scope} as {existing}")]
    DuplicateIdentity {
        /// Key of the scope
        scope: String,
        /// Identity that collided
        identity: String,
        /// Type tag of the earlier declaration
        existing: String,
    },

    /// A state record references a type tag nobody registered
    #[error("no resource type registered for tag {0}")]
    UnknownResourceType(String),

    /// The state store failed to read or write
    #[error("state store error: {0}")]
    State(String),

    /// Props or outputs could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A spawned apply was cancelled or panicked before settling
    #[error("aborted: {0}")]
    Aborted(String),

    /// Any other failure raised by a handler
    #[error("{0}")]
    Handler(Arc<anyhow::Error>),
}

impl Error {
    /// Build a state-store error from anything displayable.
    pub fn state(message: impl fmt::Display) -> Self {
        Error::State(message.to_string())
    }

    /// Strip dependency wrappers and return the error that started it all.
    pub fn original(&self) -> &Error {
        let mut current = self;
        while let Error::Dependency { source, .. } = current {
            current = source;
        }
        current
    }

    /// Provider classification of the original error, if it has one.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self.original() {
            Error::Provider(e) => Some(e.category()),
            Error::Conflict { .. } => Some(ErrorCategory::Conflict),
            Error::NotFound { .. } => Some(ErrorCategory::NotFound),
            _ => None,
        }
    }

    /// Whether the original error is a name conflict.
    pub fn is_conflict(&self) -> bool {
        self.category() == Some(ErrorCategory::Conflict)
    }

    /// Whether the original error is a missing remote object.
    pub fn is_not_found(&self) -> bool {
        self.category() == Some(ErrorCategory::NotFound)
    }

    /// Failures aggregated by a teardown sweep; empty for other errors.
    pub fn failures(&self) -> &[DestroyFailure] {
        match self {
            Error::DestroySweep { failures } => failures,
            _ => &[],
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<Error>() {
            Ok(inner) => return inner,
            Err(err) => err,
        };
        match err.downcast::<providerkit::Error>() {
            Ok(provider) => Error::Provider(provider),
            Err(err) => Error::Handler(Arc::new(err)),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
