//! Registry lifecycle events
//!
//! The registry publishes typed events over a broadcast channel. Add/update
//! events are published after the state change is applied in memory; the loud
//! remove is published before removal so listeners can still resolve the id.

/// A registry lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    RepositoryAdded { id: String },
    RepositoryUpdated { id: String },
    RepositoryRemoved { id: String },
    GroupAdded { id: String },
    GroupRemoved { id: String },
}

impl RegistryEvent {
    /// Id of the repository or group the event refers to.
    pub fn subject_id(&self) -> &str {
        match self {
            RegistryEvent::RepositoryAdded { id }
            | RegistryEvent::RepositoryUpdated { id }
            | RegistryEvent::RepositoryRemoved { id }
            | RegistryEvent::GroupAdded { id }
            | RegistryEvent::GroupRemoved { id } => id,
        }
    }
}
