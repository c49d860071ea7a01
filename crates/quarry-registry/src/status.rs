//! Background remote status checking
//!
//! Every registered non-group repository owns one status-checker task. For
//! proxies it probes the remote peer at a fixed interval and feeds the
//! outcome into the `AutoBlockController`; for hosted repositories it idles.
//! The task is cancellable so `remove_repository`/`update_repository` tear it
//! down within one polling cycle.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use quarry_core::{LocalStatus, Repository};

use crate::autoblock::AutoBlockController;
use crate::error::RegistryError;

/// Default polling interval for remote status checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Probes whether a proxy repository's remote peer is reachable.
///
/// Implementations must treat any remote answer as reachability: an HTTP
/// error status still means the peer is alive. Only connect/timeout failures
/// are probe failures.
#[async_trait]
pub trait RemoteStatusProbe: Send + Sync {
    async fn probe(&self, repository: &Repository) -> Result<(), RegistryError>;
}

/// HTTP probe hitting the proxy's remote URL.
pub struct HttpRemoteStatusProbe {
    client: reqwest::Client,
}

impl HttpRemoteStatusProbe {
    pub fn new() -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RegistryError::HttpClient {
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteStatusProbe for HttpRemoteStatusProbe {
    async fn probe(&self, repository: &Repository) -> Result<(), RegistryError> {
        let Some(proxy) = repository.proxy_state() else {
            return Ok(());
        };
        match self.client.head(proxy.remote_url().clone()).send().await {
            // any response at all means the remote peer answered
            Ok(_) => Ok(()),
            Err(e) => Err(RegistryError::RemoteUnavailable {
                id: repository.id().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Handle to one repository's background checker task.
pub(crate) struct StatusChecker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl StatusChecker {
    pub(crate) fn spawn(
        repository: Arc<Repository>,
        probe: Arc<dyn RemoteStatusProbe>,
        controller: AutoBlockController,
        interval: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // first tick fires immediately; skip it so freshly added
            // repositories are not probed before the registry call returns
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if repository.local_status() != LocalStatus::InService {
                            continue;
                        }
                        if !repository.is_proxy() {
                            continue;
                        }
                        match probe.probe(&repository).await {
                            Ok(()) => controller.record_success(&repository),
                            Err(e) => {
                                tracing::debug!(
                                    repository = %repository.id(),
                                    error = %e,
                                    "remote status probe failed"
                                );
                                controller.record_failure(&repository, &e.to_string());
                            }
                        }
                    }
                }
            }
        });
        Self { token, handle }
    }

    /// Cancel the task; it exits at the next select point.
    pub(crate) fn cancel(self) {
        self.token.cancel();
        drop(self.handle);
    }
}
