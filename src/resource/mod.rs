//! Resource types shipped with converge
//!
//! Each type implements [`declarative::ResourceType`] and can be registered
//! with an [`Engine`](declarative::Engine) like any third-party provider.

mod file;

pub use file::{FileOutput, FileProps, LocalFile};
