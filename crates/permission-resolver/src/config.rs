//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Permission resolver configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::error::{PermissionError, PermissionResult};
use crate::models::Role;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "PERMCTL";

/// Permission resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ResolverConfig {
    /// Whether resolved permissions are cached
    pub cache_enabled: bool,

    /// Cache time-to-live in seconds
    #[validate(range(max = 86400))]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached (organization, role) entries
    #[validate(range(min = 1))]
    pub cache_max_entries: usize,

    /// Outcome when no source has an entry for a key
    pub default_decision: DefaultDecision,

    /// Roles that are allowed everything without consulting the matrix
    pub superuser_roles: Vec<Role>,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: 60,
            cache_max_entries: 10_000,
            default_decision: DefaultDecision::Deny,
            superuser_roles: Vec::new(),
            storage: StorageConfig::default(),
        }
    }
}

/// Outcome applied when no permission source has an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDecision {
    Deny,
    Allow,
}

impl DefaultDecision {
    pub fn allows(&self) -> bool {
        matches!(self, DefaultDecision::Allow)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type
    pub backend: StorageBackend,
    /// Permission document path for the file backend
    pub file_path: Option<PathBuf>,
    /// Seed document loaded into the memory backend at startup
    pub seed_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            file_path: None,
            seed_path: None,
        }
    }
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

impl ResolverConfig {
    /// Load configuration from a file, with `PERMCTL_*` environment overrides
    ///
    /// Nested fields use `__`, e.g. `PERMCTL_STORAGE__BACKEND=file`.
    pub fn from_file(path: &Path) -> PermissionResult<Self> {
        Self::load(path, None)
    }

    fn load(path: &Path, env: Option<config::Map<String, String>>) -> PermissionResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?;

        let config: ResolverConfig = settings.try_deserialize()?;
        config.validate_config()?;
        Ok(config)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(content: &str) -> PermissionResult<Self> {
        let config: ResolverConfig = serde_json::from_str(content)?;
        config.validate_config()?;
        Ok(config)
    }

    /// Save configuration to file, as TOML for `.toml` paths and JSON otherwise
    pub fn save_to_file(&self, path: &Path) -> PermissionResult<()> {
        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| {
                PermissionError::serialization_error(format!("Failed to encode config: {}", e))
            })?,
            _ => serde_json::to_string_pretty(self)?,
        };
        std::fs::write(path, content).map_err(|e| {
            PermissionError::storage_error(format!(
                "Failed to write config {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Validate field ranges and cross-field constraints
    pub fn validate_config(&self) -> PermissionResult<()> {
        <Self as Validate>::validate(self)?;

        if self.storage.backend == StorageBackend::File && self.storage.file_path.is_none() {
            return Err(PermissionError::configuration_error(
                "storage.file_path is required for the file backend",
            ));
        }

        Ok(())
    }

    /// Cache time-to-live, zero when caching is disabled
    pub fn cache_ttl(&self) -> Duration {
        if self.cache_enabled {
            Duration::from_secs(self.cache_ttl_secs)
        } else {
            Duration::ZERO
        }
    }

    /// Whether a role bypasses the matrix
    pub fn is_superuser(&self, role: &Role) -> bool {
        self.superuser_roles.contains(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResolverConfig::default();
        assert!(config.cache_enabled);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.default_decision, DefaultDecision::Deny);
        assert!(config.superuser_roles.is_empty());
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn test_disabled_cache_has_zero_ttl() {
        let config = ResolverConfig {
            cache_enabled: false,
            ..Default::default()
        };
        assert_eq!(config.cache_ttl(), Duration::ZERO);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ResolverConfig::from_json_str(
            r#"{ "cache_ttl_secs": 5, "superuser_roles": ["Owner"] }"#,
        )
        .unwrap();
        assert_eq!(config.cache_ttl_secs, 5);
        assert_eq!(config.cache_max_entries, 10_000);
        assert!(config.is_superuser(&Role::Owner));
        assert!(!config.is_superuser(&Role::Manager));
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let result = ResolverConfig::from_json_str(r#"{ "cache_max_entries": 0 }"#);
        assert!(matches!(
            result,
            Err(PermissionError::ConfigurationError { .. })
        ));
    }

    #[test]
    fn test_file_backend_requires_path() {
        let result = ResolverConfig::from_json_str(r#"{ "storage": { "backend": "file" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolver.toml");
        std::fs::write(
            &path,
            "cache_ttl_secs = 30\ndefault_decision = \"allow\"\n\n[storage]\nbackend = \"memory\"\n",
        )
        .unwrap();

        let config = ResolverConfig::from_file(&path).unwrap();
        assert_eq!(config.cache_ttl_secs, 30);
        assert!(config.default_decision.allows());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolver.json");
        let config = ResolverConfig {
            cache_ttl_secs: 15,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let reloaded = ResolverConfig::from_json_str(&content).unwrap();
        assert_eq!(reloaded.cache_ttl_secs, 15);
    }

    #[test]
    fn test_save_toml_and_reload_with_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("permctl.toml");
        let config = ResolverConfig {
            cache_ttl_secs: 20,
            superuser_roles: vec![Role::Owner],
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let reloaded = ResolverConfig::from_file(&path).unwrap();
        assert_eq!(reloaded.cache_ttl_secs, 20);
        assert!(reloaded.is_superuser(&Role::Owner));
        assert_eq!(reloaded.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resolver.toml");
        std::fs::write(&path, "cache_ttl_secs = 30\ncache_max_entries = 100\n").unwrap();

        let env = config::Map::from([
            ("PERMCTL_CACHE_MAX_ENTRIES".to_string(), "5".to_string()),
            ("PERMCTL_STORAGE__BACKEND".to_string(), "file".to_string()),
            (
                "PERMCTL_STORAGE__FILE_PATH".to_string(),
                "/var/lib/permctl/permissions.json".to_string(),
            ),
            ("OTHER_CACHE_TTL_SECS".to_string(), "1".to_string()),
        ]);
        let config = ResolverConfig::load(&path, Some(env)).unwrap();

        assert_eq!(config.cache_ttl_secs, 30);
        assert_eq!(config.cache_max_entries, 5);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(
            config.storage.file_path,
            Some(PathBuf::from("/var/lib/permctl/permissions.json"))
        );
    }
}
