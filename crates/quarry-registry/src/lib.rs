//! Quarry Registry - the repository registry and its concurrency primitives
//!
//! This crate provides:
//!
//! - **`RepositoryRegistry`**: the central directory of hosted/proxy
//!   repositories and group repositories, with lifecycle events and one
//!   cancellable background status-checker task per repository
//! - **`GroupRepository`**: ordered member aggregation with transitive,
//!   cycle-safe expansion
//! - **`UidFactory` / `RepositoryItemUid` / `ItemLock`**: interned
//!   per-(repository, path) locks with reentrant, upgradeable read/write
//!   semantics shared by every reference to the same coordinate
//! - **`AutoBlockController`**: the proxy-mode state machine reacting to
//!   remote connectivity outcomes
//!
//! ## Concurrency notes
//!
//! Registry mutations (add/update/remove of repositories and groups) are
//! serialized against each other; reads proceed concurrently. Group member
//! lists carry their own lock so cascade removal never corrupts a concurrent
//! group read. `ItemLock` is the only primitive ordinary content operations
//! must acquire, and callers must not hold one across a remote call.
//!
//! Background status checkers are Tokio tasks; construct and mutate the
//! registry inside a Tokio runtime.

pub mod autoblock;
pub mod error;
pub mod events;
pub mod group;
pub mod lock;
pub mod registry;
pub mod status;
pub mod uid;

pub use autoblock::AutoBlockController;
pub use error::{RegistryError, Result};
pub use events::RegistryEvent;
pub use group::GroupRepository;
pub use lock::{Action, ItemLock};
pub use registry::RepositoryRegistry;
pub use status::{HttpRemoteStatusProbe, RemoteStatusProbe};
pub use uid::{RepositoryItemUid, UidFactory};
