//! Repository model
//!
//! A `Repository` is an identity-bearing entity: the `id` is immutable after
//! creation and never shared by two live instances. Mutable status fields
//! (local status, proxy mode, remote status) are guarded independently so that
//! reading registry membership never requires a lock on any repository's
//! internal state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::content::ContentClass;

/// Whether a repository participates in request serving at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalStatus {
    #[default]
    InService,
    OutOfService,
}

/// Write policy for deployments into a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    #[default]
    AllowWrite,
    AllowWriteOnce,
    ReadOnly,
}

/// Proxying mode of a proxy repository.
///
/// `BlockedManual` is sticky: background polling keeps `RemoteStatus` live but
/// only an explicit administrative unblock leaves this mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    #[default]
    Allow,
    BlockedAuto,
    BlockedManual,
}

impl ProxyMode {
    pub fn should_proxy(self) -> bool {
        matches!(self, ProxyMode::Allow)
    }

    /// Whether a healthy remote response may flip this mode back to `Allow`.
    pub fn should_auto_unblock(self) -> bool {
        matches!(self, ProxyMode::BlockedAuto)
    }
}

/// Last observed reachability of a proxy repository's remote peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RemoteStatus {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

/// Mutable status block of a proxy repository, guarded as one unit.
#[derive(Debug, Clone, Default)]
pub struct ProxyStatus {
    pub proxy_mode: ProxyMode,
    pub remote_status: RemoteStatus,
    /// Start of the current uninterrupted failure streak, if any.
    pub first_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Proxy-specific state: the remote peer URL plus the status block.
#[derive(Debug)]
pub struct ProxyState {
    remote_url: Url,
    status: RwLock<ProxyStatus>,
}

impl ProxyState {
    pub fn new(remote_url: Url) -> Self {
        Self {
            remote_url,
            status: RwLock::new(ProxyStatus::default()),
        }
    }

    pub fn remote_url(&self) -> &Url {
        &self.remote_url
    }

    pub fn proxy_mode(&self) -> ProxyMode {
        self.status.read().proxy_mode
    }

    pub fn remote_status(&self) -> RemoteStatus {
        self.status.read().remote_status
    }

    pub fn status_snapshot(&self) -> ProxyStatus {
        self.status.read().clone()
    }

    /// Mutate the status block under its lock.
    pub fn update_status<R>(&self, f: impl FnOnce(&mut ProxyStatus) -> R) -> R {
        f(&mut self.status.write())
    }
}

/// What kind of repository this is.
#[derive(Debug)]
pub enum RepositoryKind {
    Hosted,
    Proxy(ProxyState),
}

/// A hosted or proxy repository instance.
///
/// Group repositories are a separate type (they live in their own registry
/// namespace), see the registry crate.
#[derive(Debug)]
pub struct Repository {
    id: String,
    name: String,
    content_class: ContentClass,
    write_policy: WritePolicy,
    local_status: RwLock<LocalStatus>,
    kind: RepositoryKind,
}

impl Repository {
    pub fn hosted(
        id: impl Into<String>,
        name: impl Into<String>,
        content_class: ContentClass,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content_class,
            write_policy: WritePolicy::default(),
            local_status: RwLock::new(LocalStatus::InService),
            kind: RepositoryKind::Hosted,
        }
    }

    pub fn proxy(
        id: impl Into<String>,
        name: impl Into<String>,
        content_class: ContentClass,
        remote_url: Url,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content_class,
            write_policy: WritePolicy::ReadOnly,
            local_status: RwLock::new(LocalStatus::InService),
            kind: RepositoryKind::Proxy(ProxyState::new(remote_url)),
        }
    }

    pub fn with_write_policy(mut self, write_policy: WritePolicy) -> Self {
        self.write_policy = write_policy;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_class(&self) -> &ContentClass {
        &self.content_class
    }

    pub fn write_policy(&self) -> WritePolicy {
        self.write_policy
    }

    pub fn local_status(&self) -> LocalStatus {
        *self.local_status.read()
    }

    pub fn set_local_status(&self, status: LocalStatus) {
        *self.local_status.write() = status;
    }

    pub fn kind(&self) -> &RepositoryKind {
        &self.kind
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, RepositoryKind::Proxy(_))
    }

    /// Proxy state, or `None` for hosted repositories.
    pub fn proxy_state(&self) -> Option<&ProxyState> {
        match &self.kind {
            RepositoryKind::Proxy(state) => Some(state),
            RepositoryKind::Hosted => None,
        }
    }
}
