//! Group repositories
//!
//! A group aggregates an ordered list of member repository ids; the order is
//! the aggregation/search order. The member list carries its own lock,
//! independent of the registry-wide locking, so the registry's cascade removal
//! cannot corrupt a concurrent aggregation read.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;

use quarry_core::{ContentClass, Repository};

use crate::registry::RepositoryRegistry;

/// An ordered aggregation of member repositories.
#[derive(Debug)]
pub struct GroupRepository {
    id: String,
    name: String,
    content_class: ContentClass,
    members: RwLock<Vec<String>>,
}

impl GroupRepository {
    pub(crate) fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        content_class: ContentClass,
        members: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content_class,
            members: RwLock::new(members),
        }
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

    /// Current member ids in aggregation order.
    pub fn member_ids(&self) -> Vec<String> {
        self.members.read().clone()
    }

    pub fn contains_member(&self, id: &str) -> bool {
        self.members.read().iter().any(|m| m == id)
    }

    /// Remove a member id; returns whether it was present. A no-op removal is
    /// fine, the registry cascades removal into every group unconditionally.
    pub(crate) fn remove_member(&self, id: &str) -> bool {
        let mut members = self.members.write();
        let before = members.len();
        members.retain(|m| m != id);
        members.len() != before
    }

    pub(crate) fn set_member_ids(&self, ids: Vec<String>) {
        *self.members.write() = ids;
    }

    /// Resolve the current members to live repository instances, in order.
    ///
    /// Membership can go stale between a registry mutation and this read, so
    /// unresolvable ids are skipped, not errored. Member ids naming nested
    /// groups are skipped here too; use `transitive_member_repositories` to
    /// expand them.
    pub fn member_repositories(&self, registry: &RepositoryRegistry) -> Vec<Arc<Repository>> {
        let mut result = Vec::new();
        for member_id in self.member_ids() {
            match registry.get_repository(&member_id) {
                Ok(repository) => result.push(repository),
                Err(_) => {
                    if !registry.group_id_exists(&member_id) {
                        tracing::debug!(
                            group = %self.id,
                            member = %member_id,
                            "group member no longer registered, skipping"
                        );
                    }
                }
            }
        }
        result
    }

    /// Recursively expand nested groups into a flattened, duplicate-free,
    /// order-preserving list of repositories.
    ///
    /// Traversal is guarded by a visited set: a membership cycle is a
    /// data-integrity bug, not a crash condition.
    pub fn transitive_member_repositories(
        &self,
        registry: &RepositoryRegistry,
    ) -> Vec<Arc<Repository>> {
        let mut visited_groups = HashSet::new();
        let mut seen_repositories = HashSet::new();
        let mut result = Vec::new();
        visited_groups.insert(self.id.clone());
        self.collect_transitive(registry, &mut visited_groups, &mut seen_repositories, &mut result);
        result
    }

    fn collect_transitive(
        &self,
        registry: &RepositoryRegistry,
        visited_groups: &mut HashSet<String>,
        seen_repositories: &mut HashSet<String>,
        result: &mut Vec<Arc<Repository>>,
    ) {
        for member_id in self.member_ids() {
            if let Ok(repository) = registry.get_repository(&member_id) {
                if seen_repositories.insert(member_id) {
                    result.push(repository);
                }
            } else if let Ok(nested) = registry.get_repository_group(&member_id) {
                if visited_groups.insert(member_id) {
                    nested.collect_transitive(registry, visited_groups, seen_repositories, result);
                } else {
                    tracing::warn!(
                        group = %self.id,
                        nested = %nested.id(),
                        "membership cycle detected, skipping already visited group"
                    );
                }
            } else {
                tracing::debug!(
                    group = %self.id,
                    member = %member_id,
                    "group member no longer registered, skipping"
                );
            }
        }
    }
}
