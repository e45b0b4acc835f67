//! # converge
//!
//! Declare infrastructure as code and converge the real world to match it.
//!
//! The reconciliation core lives in the `declarative` crate and is re-exported
//! here. This crate adds what a program embedding it needs:
//!
//! - [`state::FileStateStore`]: records persisted as JSON files
//! - [`config::EngineConfig`]: `converge.toml` with app, stage, state dir and retry policy
//! - [`logging::init`]: `env_logger` setup with the usual `-v` mapping
//! - [`resource::LocalFile`]: a file on local disk, managed as a resource
//!
//! ## Example
//!
//! ```no_run
//! use converge::resource::{FileProps, LocalFile};
//! use converge::{ApplyOptions, EngineConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! converge::logging::init(1, false);
//!
//! let config = EngineConfig::discover()?;
//! let engine = config.engine()?;
//! let scope = config.root_scope();
//!
//! let files = Arc::new(LocalFile::new("/tmp/converge"));
//! engine.register(Arc::clone(&files));
//!
//! let motd = engine
//!     .apply(&scope, "motd", &files, FileProps::new("hello"), ApplyOptions::new())
//!     .await?;
//! println!("{} ({:?})", motd.path.display(), motd.change);
//!
//! engine.finalize(&scope).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod paths;
pub mod resource;
pub mod state;

pub use config::EngineConfig;
pub use state::FileStateStore;

pub use declarative::secret::{unwrap, wrap};
pub use declarative::{
    ApplyOptions, Change, Context, Dependency, DestroyFailure, DestroySummary, DiffSummary, Engine,
    EngineBuilder, Error, ErrorCategory, FieldChange, InputDiff, MaybeSecret, MemoryStateStore,
    Outcome, Output, Pending, Phase, REDACTED, Registry, ResourceInstance, ResourceType, Result,
    RetryConfig, Scope, Secret, SecretDigest, StateRecord, StateStore,
};

/// Provider transport helpers: error classification and retry.
pub mod provider {
    pub use providerkit::{
        Error, ErrorCategory, LogCallback, NoCallback, Result, RetryCallback, RetryConfig,
        is_retryable_status, with_backoff, with_retry,
    };
}
