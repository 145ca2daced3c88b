//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Permission sources consulted by the resolver
//!
//! Each layer returns the explicit entries it holds for a resolution
//! context. The resolver walks them in precedence order:
//! organization overrides, then plan presets, then global role defaults.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::PermissionResult;
use crate::models::{PermissionMatrix, PermissionSource, ResolutionContext};
use crate::storage::PermissionStorage;

/// A single permission source
#[async_trait]
pub trait PermissionLayer: Send + Sync {
    /// Layer name for logging
    fn name(&self) -> &'static str;

    /// Source reported for decisions taken by this layer
    fn source(&self) -> PermissionSource;

    /// Explicit entries this layer holds for the context
    async fn matrix(&self, ctx: &ResolutionContext) -> PermissionResult<PermissionMatrix>;
}

/// Global role defaults
pub struct GlobalRoleLayer {
    storage: Arc<dyn PermissionStorage>,
}

impl GlobalRoleLayer {
    pub fn new(storage: Arc<dyn PermissionStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PermissionLayer for GlobalRoleLayer {
    fn name(&self) -> &'static str {
        "global_role_permissions"
    }

    fn source(&self) -> PermissionSource {
        PermissionSource::Global
    }

    async fn matrix(&self, ctx: &ResolutionContext) -> PermissionResult<PermissionMatrix> {
        self.storage.global_permissions(&ctx.role).await
    }
}

/// Subscription plan presets
pub struct PlanPresetLayer {
    storage: Arc<dyn PermissionStorage>,
}

impl PlanPresetLayer {
    pub fn new(storage: Arc<dyn PermissionStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PermissionLayer for PlanPresetLayer {
    fn name(&self) -> &'static str {
        "plan_permission_presets"
    }

    fn source(&self) -> PermissionSource {
        PermissionSource::Plan
    }

    async fn matrix(&self, ctx: &ResolutionContext) -> PermissionResult<PermissionMatrix> {
        match &ctx.plan {
            Some(plan) => self.storage.plan_permissions(plan, &ctx.role).await,
            None => Ok(PermissionMatrix::new()),
        }
    }
}

/// Organization-specific overrides
pub struct OrganizationOverrideLayer {
    storage: Arc<dyn PermissionStorage>,
}

impl OrganizationOverrideLayer {
    pub fn new(storage: Arc<dyn PermissionStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl PermissionLayer for OrganizationOverrideLayer {
    fn name(&self) -> &'static str {
        "organization_permissions"
    }

    fn source(&self) -> PermissionSource {
        PermissionSource::Organization
    }

    async fn matrix(&self, ctx: &ResolutionContext) -> PermissionResult<PermissionMatrix> {
        self.storage
            .organization_permissions(&ctx.organization_id, &ctx.role)
            .await
    }
}

/// The standard layer stack, highest precedence first
pub fn default_layers(storage: Arc<dyn PermissionStorage>) -> Vec<Box<dyn PermissionLayer>> {
    vec![
        Box::new(OrganizationOverrideLayer::new(storage.clone())),
        Box::new(PlanPresetLayer::new(storage.clone())),
        Box::new(GlobalRoleLayer::new(storage)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        GlobalRolePermission, OrganizationId, OrganizationPermission, PermissionKey,
        PermissionSeed, Plan, PlanPermissionPreset, Role,
    };
    use crate::storage::MemoryPermissionStorage;

    fn key(s: &str) -> PermissionKey {
        PermissionKey::new(s).unwrap()
    }

    fn storage(org: OrganizationId) -> Arc<dyn PermissionStorage> {
        Arc::new(MemoryPermissionStorage::from_seed(PermissionSeed {
            global: vec![GlobalRolePermission {
                role: Role::Manager,
                permission_key: key("reports.view"),
                enabled: true,
            }],
            plans: vec![PlanPermissionPreset {
                plan: Plan::Starter,
                role: Role::Manager,
                permission_key: key("reports.export"),
                enabled: false,
            }],
            organizations: vec![OrganizationPermission::new(
                org,
                Role::Manager,
                key("reports.export"),
                true,
            )],
        }))
    }

    #[test]
    fn test_default_layer_order() {
        let layers = default_layers(Arc::new(MemoryPermissionStorage::new()));
        let sources: Vec<_> = layers.iter().map(|layer| layer.source()).collect();
        assert_eq!(
            sources,
            vec![
                PermissionSource::Organization,
                PermissionSource::Plan,
                PermissionSource::Global
            ]
        );
    }

    #[tokio::test]
    async fn test_plan_layer_without_plan_is_empty() {
        let org = OrganizationId::new();
        let layer = PlanPresetLayer::new(storage(org));

        let ctx = ResolutionContext::new(org, Role::Manager);
        assert!(layer.matrix(&ctx).await.unwrap().is_empty());

        let ctx = ctx.with_plan(Plan::Starter);
        let matrix = layer.matrix(&ctx).await.unwrap();
        assert_eq!(matrix.lookup(&key("reports.export")), Some(false));
    }

    #[tokio::test]
    async fn test_layers_read_their_own_slice() {
        let org = OrganizationId::new();
        let storage = storage(org);
        let ctx = ResolutionContext::new(org, Role::Manager).with_plan(Plan::Starter);

        let global = GlobalRoleLayer::new(storage.clone()).matrix(&ctx).await.unwrap();
        assert_eq!(global.lookup(&key("reports.view")), Some(true));
        assert_eq!(global.lookup(&key("reports.export")), None);

        let overrides = OrganizationOverrideLayer::new(storage)
            .matrix(&ctx)
            .await
            .unwrap();
        assert_eq!(overrides.lookup(&key("reports.export")), Some(true));
    }
}
