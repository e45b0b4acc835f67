//! Core types for resource lifecycle management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

use crate::pending::Dependency;

/// State-machine position of a single apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No record exists for the identity yet
    Create,
    /// A record exists and the declaration is still present
    Update,
    /// The resource is being torn down
    Delete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Create => "create",
            Phase::Update => "update",
            Phase::Delete => "delete",
        })
    }
}

/// What a handler tells the engine after it ran.
///
/// Failure is the `Err` side of the handler's `Result`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<O> {
    /// The remote object exists and is described by this output
    Applied(O),
    /// The declared inputs cannot be applied in place
    Replace {
        /// Tear the old object down before creating the new one
        force: bool,
    },
    /// The remote object no longer exists
    Destroyed,
}

impl<O> Outcome<O> {
    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Outcome::Applied(_) => "applied",
            Outcome::Replace { .. } => "replace",
            Outcome::Destroyed => "destroyed",
        }
    }
}

/// What an apply did to the remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// Resource was created
    Created,
    /// Resource was updated in place (or re-verified)
    Updated,
    /// Resource was recreated; the old object is deleted now or on finalize
    Replaced,
    /// Inputs matched the last run; the handler was not invoked
    Unchanged,
}

impl Change {
    /// Check if the apply touched the remote object.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// The caller-visible result of a successful apply.
///
/// Wraps the handler's value with engine-attached metadata. Dereferences
/// to the handler's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output<T> {
    /// Value returned by the handler
    pub value: T,
    /// When the remote object was first created
    pub created_at: DateTime<Utc>,
    /// When the record was last written
    pub updated_at: DateTime<Utc>,
    /// What this apply did
    pub change: Change,
}

impl<T> Output<T> {
    /// Consume the output and return the handler's value.
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Deref for Output<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Per-call options for `apply`.
#[derive(Debug, Default)]
pub struct ApplyOptions {
    /// Allow a create to bind to an existing remote object with the same
    /// physical name instead of failing with a conflict
    pub adopt: bool,
    /// Values that must settle before the handler runs
    pub depends_on: Vec<Dependency>,
}

impl ApplyOptions {
    /// Create default options (no adoption, no dependencies)
    pub fn new() -> Self {
        Self::default()
    }

    /// Permit adopting a pre-existing remote object
    pub fn adopt(mut self, adopt: bool) -> Self {
        self.adopt = adopt;
        self
    }

    /// Wait for one more value before running the handler
    pub fn depends_on(mut self, dependency: impl Into<Dependency>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    /// Wait for an ordered sequence of values before running the handler
    pub fn depends_on_all<I, D>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<Dependency>,
    {
        self.depends_on
            .extend(dependencies.into_iter().map(Into::into));
        self
    }
}

/// Result of a teardown sweep or finalize pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroySummary {
    /// `scope/identity` keys of every resource deleted, in deletion order
    pub destroyed: Vec<String>,
    /// Number of superseded objects deleted after a replace
    pub replaced_cleaned: usize,
}

impl DestroySummary {
    /// Total number of remote objects removed
    pub fn total(&self) -> usize {
        self.destroyed.len() + self.replaced_cleaned
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: DestroySummary) {
        self.destroyed.extend(other.destroyed);
        self.replaced_cleaned += other.replaced_cleaned;
    }
}
