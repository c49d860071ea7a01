//! The repository registry
//!
//! Central directory of repository instances. Holds live handles to
//! registered hosted/proxy repositories and to group repositories, publishes
//! lifecycle events, and owns one background status-checker task per
//! non-group repository.
//!
//! Groups and plain repositories live in separate maps: a group id and a
//! repository id can collide without detection. This mirrors long-standing
//! behavior that callers depend on and is deliberately not "fixed" here.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use quarry_core::{ContentClass, RegistryConfig, Repository};

use crate::autoblock::AutoBlockController;
use crate::error::{RegistryError, Result};
use crate::events::RegistryEvent;
use crate::group::GroupRepository;
use crate::status::{
    DEFAULT_CHECK_INTERVAL, HttpRemoteStatusProbe, RemoteStatusProbe, StatusChecker,
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The central repository directory.
///
/// Mutating operations are serialized against each other by a registry-wide
/// mutation lock; reads go through the map locks and proceed concurrently.
/// Status-checker tasks are Tokio tasks, so mutate the registry inside a
/// Tokio runtime.
pub struct RepositoryRegistry {
    repositories: RwLock<HashMap<String, Arc<Repository>>>,
    groups: RwLock<HashMap<String, Arc<GroupRepository>>>,
    checkers: Mutex<HashMap<String, StatusChecker>>,
    /// Serializes structural mutations spanning both maps.
    mutation: Mutex<()>,
    events: broadcast::Sender<RegistryEvent>,
    probe: Arc<dyn RemoteStatusProbe>,
    controller: AutoBlockController,
    check_interval: Duration,
}

impl RepositoryRegistry {
    /// Construct with the HTTP probe and default intervals. Fails only if the
    /// HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Ok(Self::with_probe(
            Arc::new(HttpRemoteStatusProbe::new()?),
            AutoBlockController::default(),
            DEFAULT_CHECK_INTERVAL,
        ))
    }

    /// Construct with an explicit probe, controller and polling interval.
    pub fn with_probe(
        probe: Arc<dyn RemoteStatusProbe>,
        controller: AutoBlockController,
        check_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            repositories: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            checkers: Mutex::new(HashMap::new()),
            mutation: Mutex::new(()),
            events,
            probe,
            controller,
            check_interval,
        }
    }

    /// The auto-block controller shared with the status checkers.
    pub fn controller(&self) -> &AutoBlockController {
        &self.controller
    }

    /// Subscribe to registry lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: RegistryEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    // ============ Repository operations ============

    /// Register a repository and start its status checker.
    pub fn add_repository(&self, repository: Repository) -> Arc<Repository> {
        let _mutation = self.mutation.lock();
        let repository = Arc::new(repository);
        self.insert_repository(Arc::clone(&repository), true);
        tracing::info!(
            repository = %repository.id(),
            content_class = %repository.content_class(),
            "added repository"
        );
        repository
    }

    /// Replace a registered repository's instance, restarting its checker.
    pub fn update_repository(&self, repository: Repository) -> Result<Arc<Repository>> {
        let _mutation = self.mutation.lock();
        if !self.repositories.read().contains_key(repository.id()) {
            return Err(RegistryError::NoSuchRepository {
                id: repository.id().to_string(),
            });
        }
        if let Some(old) = self.checkers.lock().remove(repository.id()) {
            old.cancel();
        }
        let repository = Arc::new(repository);
        self.insert_repository(Arc::clone(&repository), false);
        self.publish(RegistryEvent::RepositoryUpdated {
            id: repository.id().to_string(),
        });
        tracing::info!(
            repository = %repository.id(),
            content_class = %repository.content_class(),
            "updated repository"
        );
        Ok(repository)
    }

    fn insert_repository(&self, repository: Arc<Repository>, newly_added: bool) {
        let id = repository.id().to_string();
        self.repositories
            .write()
            .insert(id.clone(), Arc::clone(&repository));
        let checker = StatusChecker::spawn(
            repository,
            Arc::clone(&self.probe),
            self.controller.clone(),
            self.check_interval,
        );
        if let Some(old) = self.checkers.lock().insert(id.clone(), checker) {
            old.cancel();
        }
        if newly_added {
            self.publish(RegistryEvent::RepositoryAdded { id });
        }
    }

    /// Remove a repository, publishing the removal event before the state
    /// change so listeners can still resolve the id.
    pub fn remove_repository(&self, id: &str) -> Result<()> {
        let _mutation = self.mutation.lock();
        if !self.repositories.read().contains_key(id) {
            return Err(RegistryError::NoSuchRepository { id: id.to_string() });
        }
        self.publish(RegistryEvent::RepositoryRemoved { id: id.to_string() });
        self.remove_locked(id)
    }

    /// Remove a repository without publishing an event; used by cascades to
    /// avoid event storms.
    pub fn remove_repository_silently(&self, id: &str) -> Result<()> {
        let _mutation = self.mutation.lock();
        self.remove_locked(id)
    }

    fn remove_locked(&self, id: &str) -> Result<()> {
        if !self.repositories.read().contains_key(id) {
            return Err(RegistryError::NoSuchRepository { id: id.to_string() });
        }
        // cascade into every group; a no-op removal is expected for most
        for group in self.groups.read().values() {
            if group.remove_member(id) {
                tracing::debug!(group = %group.id(), member = %id, "removed member from group");
            }
        }
        self.repositories.write().remove(id);
        if let Some(checker) = self.checkers.lock().remove(id) {
            checker.cancel();
        }
        tracing::info!(repository = %id, "removed repository");
        Ok(())
    }

    pub fn get_repository(&self, id: &str) -> Result<Arc<Repository>> {
        self.repositories
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NoSuchRepository { id: id.to_string() })
    }

    pub fn repositories(&self) -> Vec<Arc<Repository>> {
        self.repositories.read().values().cloned().collect()
    }

    pub fn repository_ids(&self) -> Vec<String> {
        self.repositories.read().keys().cloned().collect()
    }

    pub fn repository_id_exists(&self, id: &str) -> bool {
        self.repositories.read().contains_key(id)
    }

    // ============ Group operations ============

    /// Create and register a group from an ordered member id list.
    ///
    /// Every member must resolve (repositories first, then nested groups) and
    /// all members must share a compatible content class; otherwise the whole
    /// operation fails with no partial state change.
    pub fn add_repository_group(
        &self,
        group_id: &str,
        member_ids: Vec<String>,
    ) -> Result<Arc<GroupRepository>> {
        let _mutation = self.mutation.lock();
        let mut content_class: Option<ContentClass> = None;
        for member_id in &member_ids {
            if member_id == group_id {
                return Err(RegistryError::GroupContainsItself {
                    id: group_id.to_string(),
                });
            }
            let member_class = self.member_content_class(member_id)?;
            match &content_class {
                None => content_class = Some(member_class),
                Some(class) if !class.is_compatible_with(&member_class) => {
                    return Err(RegistryError::InvalidGrouping {
                        group_class: class.id().to_string(),
                        member_class: member_class.id().to_string(),
                    });
                }
                Some(_) => {}
            }
        }
        let Some(content_class) = content_class else {
            return Err(RegistryError::EmptyGroup {
                id: group_id.to_string(),
            });
        };

        tracing::info!(
            group = %group_id,
            content_class = %content_class,
            members = ?member_ids,
            "added repository group"
        );
        let group = Arc::new(GroupRepository::new(
            group_id,
            group_id,
            content_class,
            member_ids,
        ));
        self.groups
            .write()
            .insert(group_id.to_string(), Arc::clone(&group));
        self.publish(RegistryEvent::GroupAdded {
            id: group_id.to_string(),
        });
        Ok(group)
    }

    fn member_content_class(&self, member_id: &str) -> Result<ContentClass> {
        if let Some(repository) = self.repositories.read().get(member_id) {
            return Ok(repository.content_class().clone());
        }
        if let Some(group) = self.groups.read().get(member_id) {
            return Ok(group.content_class().clone());
        }
        Err(RegistryError::NoSuchRepository {
            id: member_id.to_string(),
        })
    }

    /// Replace a group's member list, re-validating resolution and content
    /// class compatibility.
    pub fn update_repository_group(&self, group_id: &str, member_ids: Vec<String>) -> Result<()> {
        let _mutation = self.mutation.lock();
        let group = self.group_or_err(group_id)?;
        for member_id in &member_ids {
            if member_id == group_id {
                return Err(RegistryError::GroupContainsItself {
                    id: group_id.to_string(),
                });
            }
            let member_class = self.member_content_class(member_id)?;
            if !group.content_class().is_compatible_with(&member_class) {
                return Err(RegistryError::InvalidGrouping {
                    group_class: group.content_class().id().to_string(),
                    member_class: member_class.id().to_string(),
                });
            }
        }
        group.set_member_ids(member_ids);
        Ok(())
    }

    pub fn remove_repository_group(&self, group_id: &str) -> Result<()> {
        let _mutation = self.mutation.lock();
        if !self.groups.read().contains_key(group_id) {
            return Err(RegistryError::NoSuchRepositoryGroup {
                id: group_id.to_string(),
            });
        }
        self.publish(RegistryEvent::GroupRemoved {
            id: group_id.to_string(),
        });
        self.groups.write().remove(group_id);
        tracing::info!(group = %group_id, "removed repository group");
        Ok(())
    }

    pub fn get_repository_group(&self, id: &str) -> Result<Arc<GroupRepository>> {
        self.group_or_err(id)
    }

    fn group_or_err(&self, id: &str) -> Result<Arc<GroupRepository>> {
        self.groups
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NoSuchRepositoryGroup { id: id.to_string() })
    }

    pub fn group_ids(&self) -> Vec<String> {
        self.groups.read().keys().cloned().collect()
    }

    pub fn group_id_exists(&self, id: &str) -> bool {
        self.groups.read().contains_key(id)
    }

    /// Ids of all groups whose current member list contains `id`.
    pub fn groups_of_repository(&self, id: &str) -> Vec<String> {
        self.groups
            .read()
            .values()
            .filter(|group| group.contains_member(id))
            .map(|group| group.id().to_string())
            .collect()
    }

    /// Resolve a group's current members to repositories, in order.
    pub fn group_member_repositories(&self, group_id: &str) -> Result<Vec<Arc<Repository>>> {
        Ok(self.group_or_err(group_id)?.member_repositories(self))
    }

    // ============ Startup / shutdown ============

    /// Rebuild the registry from a persisted configuration, applying
    /// repository definitions then group definitions in order.
    pub fn configure(&self, config: &RegistryConfig) -> Result<()> {
        for definition in &config.repositories {
            self.add_repository(definition.build()?);
        }
        for group in &config.groups {
            self.add_repository_group(&group.id, group.members.clone())?;
        }
        Ok(())
    }

    /// Cancel every status-checker task.
    pub fn shutdown(&self) {
        let _mutation = self.mutation.lock();
        for (_, checker) in self.checkers.lock().drain() {
            checker.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quarry_core::{GroupDefinition, ProxyMode, RepositoryDefinition};
    use url::Url;

    /// Probe that never touches the network.
    struct NoopProbe;

    #[async_trait]
    impl RemoteStatusProbe for NoopProbe {
        async fn probe(&self, _repository: &Repository) -> Result<()> {
            Ok(())
        }
    }

    fn test_registry() -> RepositoryRegistry {
        RepositoryRegistry::with_probe(
            Arc::new(NoopProbe),
            AutoBlockController::default(),
            Duration::from_secs(3600),
        )
    }

    fn hosted(id: &str) -> Repository {
        Repository::hosted(id, id, ContentClass::maven2())
    }

    fn maven1_hosted(id: &str) -> Repository {
        Repository::hosted(id, id, ContentClass::maven1())
    }

    #[tokio::test]
    async fn test_default_construction_builds_http_probe() {
        let registry = RepositoryRegistry::new().unwrap();
        registry.add_repository(hosted("releases"));
        assert!(registry.repository_id_exists("releases"));
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_add_get_remove_repository() {
        let registry = test_registry();
        registry.add_repository(hosted("releases"));

        let repo = registry.get_repository("releases").unwrap();
        assert_eq!(repo.id(), "releases");
        assert!(registry.repository_id_exists("releases"));

        registry.remove_repository("releases").unwrap();
        assert!(matches!(
            registry.get_repository("releases"),
            Err(RegistryError::NoSuchRepository { .. })
        ));
        assert!(matches!(
            registry.remove_repository("releases"),
            Err(RegistryError::NoSuchRepository { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_repository_fails() {
        let registry = test_registry();
        assert!(matches!(
            registry.update_repository(hosted("ghost")),
            Err(RegistryError::NoSuchRepository { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_cascades_into_groups() {
        let registry = test_registry();
        registry.add_repository(hosted("a"));
        registry.add_repository(hosted("b"));
        let group = registry
            .add_repository_group("public", vec!["a".to_string(), "b".to_string()])
            .unwrap();

        registry.remove_repository("a").unwrap();

        let members = group.member_repositories(&registry);
        let ids: Vec<&str> = members.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(group.member_ids(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_incompatible_content_classes_rejected_without_partial_state() {
        let registry = test_registry();
        registry.add_repository(hosted("maven2-repo"));
        registry.add_repository(maven1_hosted("maven1-repo"));

        let result = registry.add_repository_group(
            "mixed",
            vec!["maven2-repo".to_string(), "maven1-repo".to_string()],
        );
        assert!(matches!(
            result,
            Err(RegistryError::InvalidGrouping { ref group_class, ref member_class })
                if group_class == "maven2" && member_class == "maven1"
        ));
        // the group must not have been created
        assert!(matches!(
            registry.get_repository_group("mixed"),
            Err(RegistryError::NoSuchRepositoryGroup { .. })
        ));
    }

    #[tokio::test]
    async fn test_group_with_unknown_member_rejected() {
        let registry = test_registry();
        registry.add_repository(hosted("a"));
        let result =
            registry.add_repository_group("public", vec!["a".to_string(), "ghost".to_string()]);
        assert!(matches!(
            result,
            Err(RegistryError::NoSuchRepository { ref id }) if id == "ghost"
        ));
        assert!(!registry.group_id_exists("public"));
    }

    #[tokio::test]
    async fn test_group_cannot_contain_itself() {
        let registry = test_registry();
        registry.add_repository(hosted("a"));
        let result =
            registry.add_repository_group("loop", vec!["a".to_string(), "loop".to_string()]);
        assert!(matches!(
            result,
            Err(RegistryError::GroupContainsItself { .. })
        ));
    }

    #[tokio::test]
    async fn test_groups_of_repository() {
        let registry = test_registry();
        registry.add_repository(hosted("a"));
        registry.add_repository(hosted("b"));
        registry
            .add_repository_group("g1", vec!["a".to_string(), "b".to_string()])
            .unwrap();
        registry
            .add_repository_group("g2", vec!["b".to_string()])
            .unwrap();

        let mut groups = registry.groups_of_repository("b");
        groups.sort();
        assert_eq!(groups, vec!["g1", "g2"]);
        assert_eq!(registry.groups_of_repository("a"), vec!["g1"]);
        assert!(registry.groups_of_repository("ghost").is_empty());
    }

    #[tokio::test]
    async fn test_transitive_members_flatten_nested_groups() {
        let registry = test_registry();
        registry.add_repository(hosted("a"));
        registry.add_repository(hosted("b"));
        registry.add_repository(hosted("c"));
        registry
            .add_repository_group("inner", vec!["b".to_string(), "c".to_string()])
            .unwrap();
        let outer = registry
            .add_repository_group(
                "outer",
                vec!["a".to_string(), "inner".to_string(), "c".to_string()],
            )
            .unwrap();

        let flat = outer.transitive_member_repositories(&registry);
        let ids: Vec<&str> = flat.iter().map(|r| r.id()).collect();
        // order preserved, duplicates dropped
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_transitive_members_survive_membership_cycle() {
        let registry = test_registry();
        registry.add_repository(hosted("a"));
        registry.add_repository(hosted("b"));
        let g1 = registry
            .add_repository_group("g1", vec!["a".to_string()])
            .unwrap();
        registry
            .add_repository_group("g2", vec!["b".to_string(), "g1".to_string()])
            .unwrap();
        // introduce a cycle behind the registry's back
        g1.set_member_ids(vec!["a".to_string(), "g2".to_string()]);

        let flat = g1.transitive_member_repositories(&registry);
        let ids: Vec<&str> = flat.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_events_published_in_order() {
        let registry = test_registry();
        let mut events = registry.subscribe();

        registry.add_repository(hosted("a"));
        registry
            .add_repository_group("g", vec!["a".to_string()])
            .unwrap();
        registry.update_repository(hosted("a")).unwrap();
        registry.remove_repository("a").unwrap();

        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::RepositoryAdded { id: "a".into() }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::GroupAdded { id: "g".into() }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::RepositoryUpdated { id: "a".into() }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::RepositoryRemoved { id: "a".into() }
        );
    }

    #[tokio::test]
    async fn test_silent_removal_publishes_no_event() {
        let registry = test_registry();
        registry.add_repository(hosted("a"));
        registry.add_repository(hosted("b"));

        let mut events = registry.subscribe();
        registry.remove_repository_silently("a").unwrap();
        registry.remove_repository("b").unwrap();

        // only the loud removal shows up
        assert_eq!(
            events.recv().await.unwrap(),
            RegistryEvent::RepositoryRemoved { id: "b".into() }
        );
    }

    #[tokio::test]
    async fn test_configure_rebuilds_from_definitions() {
        let registry = test_registry();
        let mut config = RegistryConfig::default();
        config.repositories.push(RepositoryDefinition::hosted("releases"));
        config
            .repositories
            .push(RepositoryDefinition::proxy("central", "https://repo1.maven.org/maven2/"));
        config.groups.push(GroupDefinition {
            id: "public".to_string(),
            name: None,
            members: vec!["releases".to_string(), "central".to_string()],
        });

        registry.configure(&config).unwrap();

        assert!(registry.repository_id_exists("releases"));
        assert!(registry.get_repository("central").unwrap().is_proxy());
        let members = registry.group_member_repositories("public").unwrap();
        let ids: Vec<&str> = members.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["releases", "central"]);

        registry.shutdown();
    }

    #[tokio::test]
    async fn test_update_group_revalidates_members() {
        let registry = test_registry();
        registry.add_repository(hosted("a"));
        registry.add_repository(maven1_hosted("legacy"));
        registry
            .add_repository_group("g", vec!["a".to_string()])
            .unwrap();

        assert!(matches!(
            registry.update_repository_group("g", vec!["legacy".to_string()]),
            Err(RegistryError::InvalidGrouping { .. })
        ));
        assert!(matches!(
            registry.update_repository_group("ghost", vec![]),
            Err(RegistryError::NoSuchRepositoryGroup { .. })
        ));

        registry
            .update_repository_group("g", vec!["a".to_string()])
            .unwrap();
        assert_eq!(registry.get_repository_group("g").unwrap().member_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_manual_block_via_controller_handle() {
        let registry = test_registry();
        registry.add_repository(Repository::proxy(
            "central",
            "Maven Central",
            ContentClass::maven2(),
            Url::parse("http://remote.example/maven2/").unwrap(),
        ));

        let repo = registry.get_repository("central").unwrap();
        registry.controller().block_manually(&repo).unwrap();
        assert_eq!(
            repo.proxy_state().unwrap().proxy_mode(),
            ProxyMode::BlockedManual
        );
    }
}
