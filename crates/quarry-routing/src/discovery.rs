//! Remote content discovery
//!
//! Fetches prefix lists from proxy remotes and serves per-repository and
//! group-level `PrefixSource` views. Fetch outcomes double as remote
//! reachability signals for the auto-block controller: a 404 still proves the
//! peer is alive, only connect/timeout failures count against it.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use quarry_registry::{AutoBlockController, RepositoryRegistry};

use crate::error::{Result, RoutingError};
use crate::prefix::{PREFIX_FILE_PATH, PrefixSource, parse_prefix_file};

/// Discovers and caches prefix lists per repository id.
pub struct RemoteContentDiscoverer {
    client: reqwest::Client,
    controller: AutoBlockController,
    sources: RwLock<HashMap<String, PrefixSource>>,
}

impl RemoteContentDiscoverer {
    /// Construct with a fresh HTTP client. Fails only if the client cannot be
    /// built.
    pub fn new(controller: AutoBlockController) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RoutingError::Network {
                message: e.to_string(),
            })?;
        Ok(Self::with_client(client, controller))
    }

    pub fn with_client(client: reqwest::Client, controller: AutoBlockController) -> Self {
        Self {
            client,
            controller,
            sources: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the remote prefix list of a proxy repository and store the
    /// result.
    ///
    /// Only caller errors (unknown id, not a proxy) surface; fetch outcomes
    /// are absorbed: a 404 or HTTP error marks the source non-existent, a
    /// connection failure keeps previously fetched data - stale data beats
    /// discarding good cache on a transient failure - and feeds auto-block.
    pub async fn update_prefix_list(
        &self,
        registry: &RepositoryRegistry,
        repository_id: &str,
    ) -> Result<()> {
        let repository = registry.get_repository(repository_id)?;
        let proxy = repository
            .proxy_state()
            .ok_or_else(|| RoutingError::NotAProxyRepository {
                id: repository_id.to_string(),
            })?;

        let url = format!(
            "{}/{}",
            proxy.remote_url().as_str().trim_end_matches('/'),
            PREFIX_FILE_PATH
        );
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => {
                    let entries = parse_prefix_file(&body);
                    tracing::debug!(
                        repository = %repository_id,
                        entries = entries.len(),
                        "fetched remote prefix list"
                    );
                    self.sources
                        .write()
                        .insert(repository_id.to_string(), PrefixSource::from_entries(entries));
                    self.controller.record_success(&repository);
                }
                Err(e) => {
                    // body transfer broke off; keep whatever we had
                    tracing::warn!(
                        repository = %repository_id,
                        error = %e,
                        "prefix list transfer failed, keeping previous data"
                    );
                    self.controller.record_failure(&repository, &e.to_string());
                }
            },
            Ok(response) => {
                let status = response.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    tracing::debug!(
                        repository = %repository_id,
                        "remote publishes no prefix list"
                    );
                } else {
                    tracing::warn!(
                        repository = %repository_id,
                        status = status.as_u16(),
                        "unexpected response fetching prefix list, marking as unpublished"
                    );
                }
                self.sources
                    .write()
                    .insert(repository_id.to_string(), PrefixSource::Absent);
                // the peer answered, so it is reachable
                self.controller.record_success(&repository);
            }
            Err(e) => {
                tracing::warn!(
                    repository = %repository_id,
                    error = %e,
                    "could not reach remote for prefix list, keeping previous data"
                );
                self.controller.record_failure(&repository, &e.to_string());
            }
        }
        Ok(())
    }

    /// Publish locally known prefixes for a hosted repository.
    pub fn publish_prefixes<I, S>(&self, repository_id: &str, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.sources
            .write()
            .insert(repository_id.to_string(), PrefixSource::from_entries(entries));
    }

    /// Drop the stored prefix source of a repository.
    pub fn unpublish(&self, repository_id: &str) {
        self.sources.write().remove(repository_id);
    }

    /// The current prefix source view for a repository or group id.
    ///
    /// For a group the view exists only if every member's does, and the
    /// entries are the union across members; nested groups are expanded with
    /// a visited-set guard.
    pub fn prefix_source_for(&self, registry: &RepositoryRegistry, id: &str) -> PrefixSource {
        let mut expanding = HashSet::new();
        self.source_for(registry, id, &mut expanding)
    }

    /// `expanding` holds the groups on the current expansion path only; a
    /// group reached twice through sibling paths (diamond membership) is
    /// healthy and simply expanded again, only re-entering a group still
    /// being expanded is a cycle.
    fn source_for(
        &self,
        registry: &RepositoryRegistry,
        id: &str,
        expanding: &mut HashSet<String>,
    ) -> PrefixSource {
        let Ok(group) = registry.get_repository_group(id) else {
            return self.sources.read().get(id).cloned().unwrap_or_default();
        };
        expanding.insert(id.to_string());

        let mut member_sources = Vec::new();
        for member_id in group.member_ids() {
            if expanding.contains(&member_id) {
                tracing::warn!(
                    group = %id,
                    member = %member_id,
                    "membership cycle detected, skipping group already being expanded"
                );
                continue;
            }
            let source = self.source_for(registry, &member_id, expanding);
            if !source.exists() {
                tracing::debug!(
                    group = %id,
                    member = %member_id,
                    "member has no prefix list published, group view degraded to unknown"
                );
                expanding.remove(id);
                return PrefixSource::Absent;
            }
            member_sources.push(source);
        }
        expanding.remove(id);
        PrefixSource::merged(member_sources.iter())
    }
}
