//! Quarry Routing - prefix-list discovery and propagation
//!
//! Proxy repositories may publish a plain-text "prefix list" at
//! `/.meta/prefixes.txt` describing which path prefixes their remote serves.
//! This crate fetches and parses those lists, lets hosted repositories
//! publish their locally known prefixes, and aggregates member lists into
//! group-level views: a group's prefix source exists only when every member's
//! does, and its entries are the set union of the members'.

pub mod discovery;
pub mod error;
pub mod prefix;

pub use discovery::RemoteContentDiscoverer;
pub use error::{Result, RoutingError};
pub use prefix::{PREFIX_FILE_PATH, PrefixSource, parse_prefix_file};
