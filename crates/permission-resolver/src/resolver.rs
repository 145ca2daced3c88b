//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Permission resolver combining the layered sources with the cache

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::PermissionCache;
use crate::config::{DefaultDecision, ResolverConfig};
use crate::consumers::PermissionSnapshot;
use crate::error::{PermissionError, PermissionResult};
use crate::layers::{default_layers, PermissionLayer};
use crate::models::{
    EffectiveEntry, EffectivePermissions, GlobalRolePermission, OrganizationId,
    OrganizationPermission, PermissionKey, PermissionMatrix, PermissionSource, Plan,
    PlanPermissionPreset, Resolution, ResolutionContext, Role,
};
use crate::stats::ResolverStats;
use crate::storage::PermissionStorage;

/// Resolves permissions with precedence organization > plan > global
pub struct PermissionResolver {
    /// Configuration
    config: ResolverConfig,
    /// Backing tables
    storage: Arc<dyn PermissionStorage>,
    /// Sources, highest precedence first
    layers: Vec<Box<dyn PermissionLayer>>,
    /// Resolved views keyed by (organization, role)
    cache: PermissionCache,
    /// Statistics
    stats: Arc<RwLock<ResolverStats>>,
}

impl PermissionResolver {
    /// Create a resolver over the standard layer stack
    pub fn new(
        config: ResolverConfig,
        storage: Arc<dyn PermissionStorage>,
    ) -> PermissionResult<Self> {
        let layers = default_layers(storage.clone());
        Self::with_layers(config, storage, layers)
    }

    /// Create a resolver over a custom layer stack, highest precedence first
    pub fn with_layers(
        config: ResolverConfig,
        storage: Arc<dyn PermissionStorage>,
        layers: Vec<Box<dyn PermissionLayer>>,
    ) -> PermissionResult<Self> {
        config.validate_config()?;

        let cache = PermissionCache::new(config.cache_ttl(), config.cache_max_entries);

        Ok(Self {
            config,
            storage,
            layers,
            cache,
            stats: Arc::new(RwLock::new(ResolverStats::default())),
        })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn default_decision(&self) -> DefaultDecision {
        self.config.default_decision
    }

    /// Merged view of every key known to any source for the context
    pub async fn resolve(
        &self,
        ctx: &ResolutionContext,
    ) -> PermissionResult<Arc<EffectivePermissions>> {
        if let Some(cached) = self
            .cache
            .get(&ctx.organization_id, &ctx.role, ctx.plan.as_ref())
            .await
        {
            self.stats.write().await.record_cache_hit();
            debug!(
                "Permission cache hit for {}/{}",
                ctx.organization_id, ctx.role
            );
            return Ok(cached);
        }

        self.stats.write().await.record_cache_miss();
        let generation = self.cache.generation();

        let mut matrices: Vec<(PermissionSource, PermissionMatrix)> =
            Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let matrix = layer.matrix(ctx).await?;
            debug!(
                "Layer {} returned {} entries for {}/{}",
                layer.name(),
                matrix.len(),
                ctx.organization_id,
                ctx.role
            );
            matrices.push((layer.source(), matrix));
        }

        let keys: BTreeSet<&PermissionKey> = matrices
            .iter()
            .flat_map(|(_, matrix)| matrix.keys())
            .collect();

        let mut entries = BTreeMap::new();
        for key in keys {
            if let Some(entry) = first_decision(&matrices, key) {
                entries.insert(key.clone(), entry);
            }
        }

        let mut effective = EffectivePermissions::empty(ctx);
        effective.entries = entries;
        let effective = Arc::new(effective);

        self.cache.insert(effective.clone(), generation).await;
        Ok(effective)
    }

    /// Decide a single key and report which source decided it
    pub async fn explain(
        &self,
        ctx: &ResolutionContext,
        permission_key: &str,
    ) -> PermissionResult<Resolution> {
        let key = PermissionKey::new(permission_key)?;

        let (allowed, source) = if self.config.is_superuser(&ctx.role) {
            (true, PermissionSource::Superuser)
        } else {
            let effective = self.resolve(ctx).await?;
            match effective.decision(&key) {
                Some(entry) => (entry.allowed, entry.source),
                None => (
                    self.config.default_decision.allows(),
                    PermissionSource::Default,
                ),
            }
        };

        self.stats.write().await.record_permission_check(allowed);
        debug!(
            "{} for {}/{} resolved to {} via {}",
            key, ctx.organization_id, ctx.role, allowed, source
        );

        Ok(Resolution {
            permission_key: key,
            allowed,
            source,
        })
    }

    /// Whether the key is allowed for the context
    pub async fn is_allowed(
        &self,
        ctx: &ResolutionContext,
        permission_key: &str,
    ) -> PermissionResult<bool> {
        Ok(self.explain(ctx, permission_key).await?.allowed)
    }

    /// Fail with `PermissionDenied` unless the key is allowed
    pub async fn require(
        &self,
        ctx: &ResolutionContext,
        permission_key: &str,
    ) -> PermissionResult<()> {
        if self.is_allowed(ctx, permission_key).await? {
            Ok(())
        } else {
            Err(denied(ctx, permission_key))
        }
    }

    /// Fail unless every key is allowed; reports the first denied key
    pub async fn require_all(
        &self,
        ctx: &ResolutionContext,
        permission_keys: &[&str],
    ) -> PermissionResult<()> {
        for permission_key in permission_keys {
            self.require(ctx, permission_key).await?;
        }
        Ok(())
    }

    /// Fail with `NoPermissionGranted` unless at least one key is allowed
    pub async fn require_any(
        &self,
        ctx: &ResolutionContext,
        permission_keys: &[&str],
    ) -> PermissionResult<()> {
        for permission_key in permission_keys {
            if self.is_allowed(ctx, permission_key).await? {
                return Ok(());
            }
        }
        Err(PermissionError::no_permission_granted(
            ctx.organization_id.to_string(),
            ctx.role.as_str(),
            permission_keys.iter().map(|key| key.to_string()).collect(),
        ))
    }

    /// Immutable view for UI gating
    pub async fn snapshot(&self, ctx: &ResolutionContext) -> PermissionResult<PermissionSnapshot> {
        let superuser = self.config.is_superuser(&ctx.role);
        let effective = self.resolve(ctx).await?;
        Ok(PermissionSnapshot::new(
            effective,
            self.config.default_decision,
            superuser,
        ))
    }

    /// Set a global role default; affects every organization
    pub async fn set_global_permission(
        &self,
        role: Role,
        permission_key: &str,
        enabled: bool,
    ) -> PermissionResult<()> {
        let row = GlobalRolePermission {
            role,
            permission_key: PermissionKey::new(permission_key)?,
            enabled,
        };
        // Invalidate even when the write fails
        let written = self.storage.upsert_global_permission(&row).await;
        self.invalidate_all().await;
        written?;

        info!(
            "Set global permission {} = {} for role {}",
            row.permission_key, enabled, row.role
        );
        Ok(())
    }

    /// Set a plan preset entry; affects every organization on any plan
    pub async fn set_plan_permission(
        &self,
        plan: Plan,
        role: Role,
        permission_key: &str,
        enabled: bool,
    ) -> PermissionResult<()> {
        let row = PlanPermissionPreset {
            plan,
            role,
            permission_key: PermissionKey::new(permission_key)?,
            enabled,
        };
        let written = self.storage.upsert_plan_permission(&row).await;
        self.invalidate_all().await;
        written?;

        info!(
            "Set plan permission {} = {} for {}/{}",
            row.permission_key, enabled, row.plan, row.role
        );
        Ok(())
    }

    /// Set an organization-specific override
    pub async fn set_organization_permission(
        &self,
        organization_id: OrganizationId,
        role: Role,
        permission_key: &str,
        enabled: bool,
    ) -> PermissionResult<()> {
        let row = OrganizationPermission::new(
            organization_id,
            role,
            PermissionKey::new(permission_key)?,
            enabled,
        );
        let written = self.storage.upsert_organization_permission(&row).await;
        self.invalidate(&organization_id, &row.role).await;
        written?;

        info!(
            "Set organization permission {} = {} for {}/{}",
            row.permission_key, enabled, organization_id, row.role
        );
        Ok(())
    }

    /// Remove an organization-specific override, falling back to plan and global
    pub async fn remove_organization_permission(
        &self,
        organization_id: OrganizationId,
        role: Role,
        permission_key: &str,
    ) -> PermissionResult<()> {
        let key = PermissionKey::new(permission_key)?;
        let removed = self
            .storage
            .remove_organization_permission(&organization_id, &role, &key)
            .await;
        self.invalidate(&organization_id, &role).await;
        removed?;

        info!(
            "Removed organization permission {} for {}/{}",
            key, organization_id, role
        );
        Ok(())
    }

    /// Drop every override of an organization
    pub async fn reset_organization(
        &self,
        organization_id: OrganizationId,
    ) -> PermissionResult<usize> {
        let removed = self.storage.clear_organization(&organization_id).await;
        self.invalidate_organization(&organization_id).await;
        let removed = removed?;

        info!(
            "Reset {} permission overrides for organization {}",
            removed, organization_id
        );
        Ok(removed)
    }

    /// Drop the cached view of one (organization, role)
    pub async fn invalidate(&self, organization_id: &OrganizationId, role: &Role) {
        self.cache.invalidate(organization_id, role).await;
        self.stats.write().await.record_invalidation();
    }

    /// Drop every cached view of an organization
    pub async fn invalidate_organization(&self, organization_id: &OrganizationId) {
        let removed = self.cache.invalidate_organization(organization_id).await;
        self.stats.write().await.record_invalidation();
        debug!(
            "Invalidated {} cached views for organization {}",
            removed, organization_id
        );
    }

    /// Drop every cached view
    pub async fn invalidate_all(&self) {
        let removed = self.cache.invalidate_all().await;
        self.stats.write().await.record_invalidation();
        debug!("Invalidated all {} cached views", removed);
    }

    /// Remove expired cache entries
    pub async fn purge_expired(&self) -> usize {
        self.cache.purge_expired().await
    }

    pub fn storage(&self) -> &Arc<dyn PermissionStorage> {
        &self.storage
    }

    pub async fn get_stats(&self) -> ResolverStats {
        self.stats.read().await.clone()
    }
}

fn first_decision(
    matrices: &[(PermissionSource, PermissionMatrix)],
    key: &PermissionKey,
) -> Option<EffectiveEntry> {
    matrices.iter().find_map(|(source, matrix)| {
        matrix.lookup(key).map(|allowed| EffectiveEntry {
            allowed,
            source: *source,
        })
    })
}

fn denied(ctx: &ResolutionContext, permission_key: &str) -> PermissionError {
    PermissionError::permission_denied(
        ctx.organization_id.to_string(),
        ctx.role.as_str(),
        permission_key,
    )
}
