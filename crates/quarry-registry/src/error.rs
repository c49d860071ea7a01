//! Error types for registry operations

use thiserror::Error;

/// Registry operation errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("No such repository: {id}")]
    NoSuchRepository { id: String },

    #[error("No such repository group: {id}")]
    NoSuchRepositoryGroup { id: String },

    #[error("Invalid grouping: content class {group_class} is not compatible with member content class {member_class}")]
    InvalidGrouping {
        group_class: String,
        member_class: String,
    },

    #[error("Group {id} cannot contain itself")]
    GroupContainsItself { id: String },

    #[error("Group {id} must have at least one member")]
    EmptyGroup { id: String },

    #[error("Repository {id} is not a proxy repository")]
    NotAProxyRepository { id: String },

    #[error("Malformed uid string: {value} (expected '<repositoryId>:<path>')")]
    MalformedUid { value: String },

    #[error("Remote of repository {id} unavailable: {reason}")]
    RemoteUnavailable { id: String, reason: String },

    #[error("Failed to build HTTP client: {message}")]
    HttpClient { message: String },

    #[error(transparent)]
    Core(#[from] quarry_core::CoreError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
