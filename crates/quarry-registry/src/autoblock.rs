//! Proxy auto-block state machine
//!
//! Tracks remote reachability per proxy repository and flips its `ProxyMode`:
//! `Allow -> BlockedAuto` once connection failures have persisted for the
//! retain time with no intervening success, `BlockedAuto -> Allow` on the
//! first healthy response. `BlockedManual` is set and cleared by
//! administrators only; polling keeps `RemoteStatus` live underneath it but
//! never changes the mode.

use chrono::Utc;
use std::time::Duration;

use quarry_core::{ProxyMode, RemoteStatus, Repository};

use crate::error::{RegistryError, Result};

/// Default failure retain time before a proxy is auto-blocked.
pub const DEFAULT_RETAIN_TIME: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AutoBlockController {
    retain_time: Duration,
}

impl Default for AutoBlockController {
    fn default() -> Self {
        Self::new(DEFAULT_RETAIN_TIME)
    }
}

impl AutoBlockController {
    pub fn new(retain_time: Duration) -> Self {
        Self { retain_time }
    }

    pub fn retain_time(&self) -> Duration {
        self.retain_time
    }

    /// Record a successful remote contact. No-op for non-proxy repositories.
    pub fn record_success(&self, repository: &Repository) {
        let Some(proxy) = repository.proxy_state() else {
            return;
        };
        proxy.update_status(|status| {
            status.remote_status = RemoteStatus::Available;
            status.last_success_at = Some(Utc::now());
            status.first_failure_at = None;
            if status.proxy_mode.should_auto_unblock() {
                tracing::warn!(
                    repository = %repository.id(),
                    "remote peer detected as healthy, un-blocking auto-blocked proxy repository"
                );
                status.proxy_mode = ProxyMode::Allow;
            }
        });
    }

    /// Record a remote connection failure. No-op for non-proxy repositories.
    ///
    /// Failures are an expected background signal: they are never surfaced to
    /// unrelated callers, only observable through `proxy_mode`/`remote_status`.
    pub fn record_failure(&self, repository: &Repository, reason: &str) {
        let Some(proxy) = repository.proxy_state() else {
            return;
        };
        let now = Utc::now();
        proxy.update_status(|status| {
            status.remote_status = RemoteStatus::Unavailable;
            let first_failure = *status.first_failure_at.get_or_insert(now);
            if status.proxy_mode != ProxyMode::Allow {
                return;
            }
            let persisted = (now - first_failure)
                .to_std()
                .map_or(false, |elapsed| elapsed >= self.retain_time);
            if persisted {
                tracing::warn!(
                    repository = %repository.id(),
                    reason,
                    "remote peer keeps failing, auto-blocking proxy repository"
                );
                status.proxy_mode = ProxyMode::BlockedAuto;
            }
        });
    }

    /// Administratively block a proxy repository. Sticky until `unblock`.
    pub fn block_manually(&self, repository: &Repository) -> Result<()> {
        let proxy = repository
            .proxy_state()
            .ok_or_else(|| RegistryError::NotAProxyRepository {
                id: repository.id().to_string(),
            })?;
        proxy.update_status(|status| {
            status.proxy_mode = ProxyMode::BlockedManual;
        });
        tracing::info!(repository = %repository.id(), "proxy repository manually blocked");
        Ok(())
    }

    /// Explicitly unblock a proxy repository, clearing manual or auto blocks.
    pub fn unblock(&self, repository: &Repository) -> Result<()> {
        let proxy = repository
            .proxy_state()
            .ok_or_else(|| RegistryError::NotAProxyRepository {
                id: repository.id().to_string(),
            })?;
        proxy.update_status(|status| {
            status.proxy_mode = ProxyMode::Allow;
            status.first_failure_at = None;
        });
        tracing::info!(repository = %repository.id(), "proxy repository unblocked");
        Ok(())
    }
}
