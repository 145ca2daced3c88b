//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Permission table storage abstraction

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{PermissionError, PermissionResult};
use crate::models::{
    GlobalRolePermission, OrganizationId, OrganizationPermission, PermissionKey,
    PermissionMatrix, PermissionSeed, Plan, PlanPermissionPreset, Role,
};

/// Storage for the three permission tables
#[async_trait]
pub trait PermissionStorage: Send + Sync {
    /// Global defaults for a role
    async fn global_permissions(&self, role: &Role) -> PermissionResult<PermissionMatrix>;

    /// Plan preset for a role
    async fn plan_permissions(&self, plan: &Plan, role: &Role)
        -> PermissionResult<PermissionMatrix>;

    /// Organization overrides for a role
    async fn organization_permissions(
        &self,
        organization_id: &OrganizationId,
        role: &Role,
    ) -> PermissionResult<PermissionMatrix>;

    /// Insert or replace a global default
    async fn upsert_global_permission(&self, row: &GlobalRolePermission) -> PermissionResult<()>;

    /// Insert or replace a plan preset entry
    async fn upsert_plan_permission(&self, row: &PlanPermissionPreset) -> PermissionResult<()>;

    /// Insert or replace an organization override
    async fn upsert_organization_permission(
        &self,
        row: &OrganizationPermission,
    ) -> PermissionResult<()>;

    /// Remove a single organization override
    async fn remove_organization_permission(
        &self,
        organization_id: &OrganizationId,
        role: &Role,
        permission_key: &PermissionKey,
    ) -> PermissionResult<()>;

    /// Remove every override of an organization, returning how many were removed
    async fn clear_organization(&self, organization_id: &OrganizationId)
        -> PermissionResult<usize>;

    /// Dump all tables
    async fn export_seed(&self) -> PermissionResult<PermissionSeed>;
}

type OrganizationRows = BTreeMap<PermissionKey, OrganizationPermission>;

#[derive(Debug, Default, Clone)]
struct PermissionTables {
    global: HashMap<Role, PermissionMatrix>,
    plans: HashMap<(Plan, Role), PermissionMatrix>,
    organizations: HashMap<(OrganizationId, Role), OrganizationRows>,
}

impl PermissionTables {
    fn from_seed(seed: PermissionSeed) -> Self {
        let mut tables = Self::default();
        for row in &seed.global {
            tables.upsert_global(row);
        }
        for row in &seed.plans {
            tables.upsert_plan(row);
        }
        for row in &seed.organizations {
            tables.upsert_organization(row);
        }
        tables
    }

    fn to_seed(&self) -> PermissionSeed {
        let mut seed = PermissionSeed::default();

        for (role, matrix) in &self.global {
            seed.global.extend(matrix.iter().map(|(key, enabled)| GlobalRolePermission {
                role: role.clone(),
                permission_key: key.clone(),
                enabled: *enabled,
            }));
        }

        for ((plan, role), matrix) in &self.plans {
            seed.plans.extend(matrix.iter().map(|(key, enabled)| PlanPermissionPreset {
                plan: plan.clone(),
                role: role.clone(),
                permission_key: key.clone(),
                enabled: *enabled,
            }));
        }

        for rows in self.organizations.values() {
            seed.organizations.extend(rows.values().cloned());
        }

        // HashMap iteration order is arbitrary; keep exports stable
        seed.global
            .sort_by(|a, b| (&a.role, &a.permission_key).cmp(&(&b.role, &b.permission_key)));
        seed.plans.sort_by(|a, b| {
            (&a.plan, &a.role, &a.permission_key).cmp(&(&b.plan, &b.role, &b.permission_key))
        });
        seed.organizations.sort_by(|a, b| {
            (&a.organization_id, &a.role, &a.permission_key).cmp(&(
                &b.organization_id,
                &b.role,
                &b.permission_key,
            ))
        });

        seed
    }

    fn global_matrix(&self, role: &Role) -> PermissionMatrix {
        self.global.get(role).cloned().unwrap_or_default()
    }

    fn plan_matrix(&self, plan: &Plan, role: &Role) -> PermissionMatrix {
        self.plans
            .get(&(plan.clone(), role.clone()))
            .cloned()
            .unwrap_or_default()
    }

    fn organization_matrix(&self, organization_id: &OrganizationId, role: &Role) -> PermissionMatrix {
        self.organizations
            .get(&(*organization_id, role.clone()))
            .map(|rows| {
                rows.values()
                    .map(|row| (row.permission_key.clone(), row.enabled))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn upsert_global(&mut self, row: &GlobalRolePermission) {
        self.global
            .entry(row.role.clone())
            .or_default()
            .set(row.permission_key.clone(), row.enabled);
    }

    fn upsert_plan(&mut self, row: &PlanPermissionPreset) {
        self.plans
            .entry((row.plan.clone(), row.role.clone()))
            .or_default()
            .set(row.permission_key.clone(), row.enabled);
    }

    fn upsert_organization(&mut self, row: &OrganizationPermission) {
        self.organizations
            .entry((row.organization_id, row.role.clone()))
            .or_default()
            .insert(row.permission_key.clone(), row.clone());
    }

    fn remove_organization(
        &mut self,
        organization_id: &OrganizationId,
        role: &Role,
        permission_key: &PermissionKey,
    ) -> PermissionResult<()> {
        let slot = (*organization_id, role.clone());
        let removed = self
            .organizations
            .get_mut(&slot)
            .and_then(|rows| rows.remove(permission_key));

        if removed.is_none() {
            return Err(PermissionError::permission_not_found(permission_key.as_str()));
        }

        if self.organizations.get(&slot).is_some_and(|rows| rows.is_empty()) {
            self.organizations.remove(&slot);
        }

        Ok(())
    }

    fn clear_organization(&mut self, organization_id: &OrganizationId) -> usize {
        let mut removed = 0;
        self.organizations.retain(|(org, _), rows| {
            if org == organization_id {
                removed += rows.len();
                false
            } else {
                true
            }
        });
        removed
    }
}

/// In-memory permission storage
#[derive(Debug)]
pub struct MemoryPermissionStorage {
    tables: Arc<RwLock<PermissionTables>>,
}

impl MemoryPermissionStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(PermissionTables::default())),
        }
    }

    /// Create a storage pre-populated from a seed document
    pub fn from_seed(seed: PermissionSeed) -> Self {
        Self {
            tables: Arc::new(RwLock::new(PermissionTables::from_seed(seed))),
        }
    }
}

impl Default for MemoryPermissionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionStorage for MemoryPermissionStorage {
    async fn global_permissions(&self, role: &Role) -> PermissionResult<PermissionMatrix> {
        Ok(self.tables.read().await.global_matrix(role))
    }

    async fn plan_permissions(
        &self,
        plan: &Plan,
        role: &Role,
    ) -> PermissionResult<PermissionMatrix> {
        Ok(self.tables.read().await.plan_matrix(plan, role))
    }

    async fn organization_permissions(
        &self,
        organization_id: &OrganizationId,
        role: &Role,
    ) -> PermissionResult<PermissionMatrix> {
        Ok(self
            .tables
            .read()
            .await
            .organization_matrix(organization_id, role))
    }

    async fn upsert_global_permission(&self, row: &GlobalRolePermission) -> PermissionResult<()> {
        self.tables.write().await.upsert_global(row);
        Ok(())
    }

    async fn upsert_plan_permission(&self, row: &PlanPermissionPreset) -> PermissionResult<()> {
        self.tables.write().await.upsert_plan(row);
        Ok(())
    }

    async fn upsert_organization_permission(
        &self,
        row: &OrganizationPermission,
    ) -> PermissionResult<()> {
        self.tables.write().await.upsert_organization(row);
        Ok(())
    }

    async fn remove_organization_permission(
        &self,
        organization_id: &OrganizationId,
        role: &Role,
        permission_key: &PermissionKey,
    ) -> PermissionResult<()> {
        self.tables
            .write()
            .await
            .remove_organization(organization_id, role, permission_key)
    }

    async fn clear_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PermissionResult<usize> {
        Ok(self.tables.write().await.clear_organization(organization_id))
    }

    async fn export_seed(&self) -> PermissionResult<PermissionSeed> {
        Ok(self.tables.read().await.to_seed())
    }
}

/// File-backed permission storage
///
/// Keeps the tables in memory and rewrites the whole JSON document on every
/// mutation. A mutation is applied to a staged copy and only becomes visible
/// once the document has been written.
#[derive(Debug)]
pub struct FilePermissionStorage {
    file_path: PathBuf,
    tables: RwLock<PermissionTables>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FilePermissionStorage {
    /// Open a permission document, starting empty if the file does not exist
    pub async fn open(file_path: impl AsRef<Path>) -> PermissionResult<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        let seed = match tokio::fs::read_to_string(&file_path).await {
            Ok(content) => PermissionSeed::from_json_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Permission file {} not found, starting empty", file_path.display());
                PermissionSeed::default()
            }
            Err(e) => {
                return Err(PermissionError::storage_error(format!(
                    "Failed to read {}: {}",
                    file_path.display(),
                    e
                )))
            }
        };

        info!(
            "Loaded {} permission rows from {}",
            seed.len(),
            file_path.display()
        );

        Ok(Self {
            file_path,
            tables: RwLock::new(PermissionTables::from_seed(seed)),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Path of the backing document
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Apply a mutation to a staged copy, persist it, then publish it
    async fn apply<T>(
        &self,
        mutate: impl FnOnce(&mut PermissionTables) -> PermissionResult<T>,
    ) -> PermissionResult<T> {
        let _guard = self.write_lock.lock().await;

        let mut staged = self.tables.read().await.clone();
        let outcome = mutate(&mut staged)?;
        self.persist(&staged).await?;

        *self.tables.write().await = staged;
        Ok(outcome)
    }

    async fn persist(&self, tables: &PermissionTables) -> PermissionResult<()> {
        let content = tables.to_seed().to_json_pretty()?;

        let tmp_path = self.file_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await.map_err(|e| {
            PermissionError::storage_error(format!("Failed to write {}: {}", tmp_path.display(), e))
        })?;
        tokio::fs::rename(&tmp_path, &self.file_path)
            .await
            .map_err(|e| {
                PermissionError::storage_error(format!(
                    "Failed to replace {}: {}",
                    self.file_path.display(),
                    e
                ))
            })?;

        debug!("Persisted permission tables to {}", self.file_path.display());
        Ok(())
    }
}

#[async_trait]
impl PermissionStorage for FilePermissionStorage {
    async fn global_permissions(&self, role: &Role) -> PermissionResult<PermissionMatrix> {
        Ok(self.tables.read().await.global_matrix(role))
    }

    async fn plan_permissions(
        &self,
        plan: &Plan,
        role: &Role,
    ) -> PermissionResult<PermissionMatrix> {
        Ok(self.tables.read().await.plan_matrix(plan, role))
    }

    async fn organization_permissions(
        &self,
        organization_id: &OrganizationId,
        role: &Role,
    ) -> PermissionResult<PermissionMatrix> {
        Ok(self
            .tables
            .read()
            .await
            .organization_matrix(organization_id, role))
    }

    async fn upsert_global_permission(&self, row: &GlobalRolePermission) -> PermissionResult<()> {
        self.apply(|tables| {
            tables.upsert_global(row);
            Ok(())
        })
        .await
    }

    async fn upsert_plan_permission(&self, row: &PlanPermissionPreset) -> PermissionResult<()> {
        self.apply(|tables| {
            tables.upsert_plan(row);
            Ok(())
        })
        .await
    }

    async fn upsert_organization_permission(
        &self,
        row: &OrganizationPermission,
    ) -> PermissionResult<()> {
        self.apply(|tables| {
            tables.upsert_organization(row);
            Ok(())
        })
        .await
    }

    async fn remove_organization_permission(
        &self,
        organization_id: &OrganizationId,
        role: &Role,
        permission_key: &PermissionKey,
    ) -> PermissionResult<()> {
        self.apply(|tables| tables.remove_organization(organization_id, role, permission_key))
            .await
    }

    async fn clear_organization(
        &self,
        organization_id: &OrganizationId,
    ) -> PermissionResult<usize> {
        if !self
            .tables
            .read()
            .await
            .organizations
            .keys()
            .any(|(org, _)| org == organization_id)
        {
            return Ok(0);
        }
        self.apply(|tables| Ok(tables.clear_organization(organization_id)))
            .await
    }

    async fn export_seed(&self) -> PermissionResult<PermissionSeed> {
        Ok(self.tables.read().await.to_seed())
    }
}

/// Build the storage backend described by the configuration
///
/// The memory backend is populated from `seed_path` when set, otherwise from
/// `fallback_seed`.
pub async fn from_config(
    config: &StorageConfig,
    fallback_seed: PermissionSeed,
) -> PermissionResult<Arc<dyn PermissionStorage>> {
    match config.backend {
        StorageBackend::Memory => {
            let seed = match &config.seed_path {
                Some(path) => PermissionSeed::from_file(path)?,
                None => fallback_seed,
            };
            info!("Using in-memory permission storage with {} rows", seed.len());
            Ok(Arc::new(MemoryPermissionStorage::from_seed(seed)))
        }
        StorageBackend::File => {
            let path = config.file_path.as_ref().ok_or_else(|| {
                PermissionError::configuration_error(
                    "storage.file_path is required for the file backend",
                )
            })?;
            Ok(Arc::new(FilePermissionStorage::open(path).await?))
        }
    }
}
