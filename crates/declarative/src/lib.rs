//! # Declarative
//!
//! A reconciliation engine for declared infrastructure.
//!
//! Callers declare resources inside a [`Scope`]; the [`Engine`] converges
//! the remote world to match across repeated runs, persisting what it did
//! in a [`StateStore`].
//!
//! ## Core Concepts
//!
//! - **Scope**: hierarchical namespace per app and stage; owns physical naming
//! - **ResourceType**: the one provider contract, `handle(ctx, identity, props)`
//! - **Phase**: create, update or delete, decided from the stored record
//! - **Outcome**: what the handler did: applied, asked for a replace, or destroyed
//! - **Pending**: a value that settles later, usable as a `depends_on` edge
//! - **Secret**: a value that is redacted in every record and log line
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ApplyOptions, Engine, Scope};
//! use std::sync::Arc;
//!
//! let engine = Engine::in_memory();
//! let scope = Scope::root("shop", "dev");
//! let buckets = Arc::new(BucketType::new(client));
//!
//! let assets = engine.declare(&scope, "assets", &buckets, BucketProps::default(), ApplyOptions::new());
//! let site = engine
//!     .apply(&scope, "site", &sites, SiteProps::default(), ApplyOptions::new().depends_on(&assets))
//!     .await?;
//!
//! engine.finalize(&scope).await?;
//! // later
//! engine.destroy(&scope).await?;
//! ```

pub mod context;
pub mod destroy;
pub mod diff;
pub mod error;
pub mod executor;
pub mod pending;
pub mod planner;
pub mod resource;
mod scheduler;
pub mod scope;
pub mod secret;
pub mod state;
mod sync;
pub mod types;

pub use context::Context;
pub use diff::{DiffSummary, FieldChange, InputDiff};
pub use error::{DestroyFailure, Error, Result};
pub use executor::{Engine, EngineBuilder};
pub use pending::{Dependency, Pending, Target};
pub use planner::{TeardownNode, TeardownPlan};
pub use resource::{Registry, ResourceType};
pub use scope::{ResourceInstance, Scope};
pub use secret::{MaybeSecret, REDACTED, Reveal, Secret, SecretDigest};
pub use state::{MemoryStateStore, StateRecord, StateStore};
pub use types::{ApplyOptions, Change, DestroySummary, Outcome, Output, Phase};

pub use providerkit::{ErrorCategory, RetryConfig};
