//! Registry configuration file
//!
//! The registry is rebuilt at startup from an ordered list of repository and
//! group definitions, stored in `~/.config/quarry/registry.yaml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::content::ContentClass;
use crate::error::{CoreError, Result};
use crate::repository::{LocalStatus, Repository, WritePolicy};

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Ordered repository definitions; applied in order on startup.
    #[serde(default)]
    pub repositories: Vec<RepositoryDefinition>,

    /// Ordered group definitions; applied after all repositories.
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
}

fn default_api_version() -> String {
    "quarry.io/v1".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            repositories: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default configuration path.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("quarry").join("registry.yaml"))
    }

    pub fn get_repository(&self, id: &str) -> Option<&RepositoryDefinition> {
        self.repositories.iter().find(|r| r.id == id)
    }

    pub fn get_group(&self, id: &str) -> Option<&GroupDefinition> {
        self.groups.iter().find(|g| g.id == id)
    }
}

/// Persisted definition of a single hosted or proxy repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryDefinition {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "ContentClass::maven2")]
    pub content_class: ContentClass,

    #[serde(default)]
    pub local_status: LocalStatus,

    #[serde(default)]
    pub write_policy: Option<WritePolicy>,

    /// Remote peer URL; present for proxy repositories, absent for hosted.
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl RepositoryDefinition {
    pub fn hosted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            content_class: ContentClass::maven2(),
            local_status: LocalStatus::InService,
            write_policy: None,
            remote_url: None,
        }
    }

    pub fn proxy(id: impl Into<String>, remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: Some(remote_url.into()),
            write_policy: Some(WritePolicy::ReadOnly),
            ..Self::hosted(id)
        }
    }

    /// Build a live `Repository` instance from this definition.
    pub fn build(&self) -> Result<Repository> {
        let name = self.name.clone().unwrap_or_else(|| self.id.clone());
        let mut repo = match &self.remote_url {
            Some(raw) => {
                let url = Url::parse(raw).map_err(|e| CoreError::InvalidRemoteUrl {
                    url: raw.clone(),
                    reason: e.to_string(),
                })?;
                Repository::proxy(&self.id, name, self.content_class.clone(), url)
            }
            None => Repository::hosted(&self.id, name, self.content_class.clone()),
        };
        if let Some(policy) = self.write_policy {
            repo = repo.with_write_policy(policy);
        }
        repo.set_local_status(self.local_status);
        Ok(repo)
    }
}

/// Persisted definition of a group repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDefinition {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Member repository ids, in aggregation/search order.
    pub members: Vec<String>,
}
