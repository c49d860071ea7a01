//! Quarry Core - Foundational types for the Quarry artifact repository manager
//!
//! This crate provides the types shared by the registry and routing crates:
//! - `ContentClass`: path/layout compatibility marker (maven2, maven1, ...)
//! - `Repository`: a hosted or proxy repository instance with independently
//!   guarded status fields
//! - `RegistryConfig`: the persisted repository/group definition list the
//!   registry is rebuilt from on startup

pub mod config;
pub mod content;
pub mod error;
pub mod repository;

pub use config::{GroupDefinition, RegistryConfig, RepositoryDefinition};
pub use content::ContentClass;
pub use error::{CoreError, Result};
pub use repository::{
    LocalStatus, ProxyMode, ProxyState, ProxyStatus, RemoteStatus, Repository, RepositoryKind,
    WritePolicy,
};
