//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Permission resolution for the Ledgerdesk business suite
//!
//! This crate decides whether a member of an organization may perform an
//! action, given their role and the organization's subscription plan:
//! - Global role defaults: `(role, permission_key) -> enabled`
//! - Plan presets: `(plan, role, permission_key) -> enabled`
//! - Organization overrides: `(organization_id, role, permission_key) -> enabled`
//!
//! Sources are consulted organization first, then plan, then global. Within a
//! source an exact key wins over its module wildcard (`invoices.*`).
//! Resolved views are cached per (organization, role) for a short TTL and
//! invalidated on every write made through the resolver.
//!
//! # Example
//!
//! ```rust
//! use permission_resolver::{
//!     catalog, MemoryPermissionStorage, OrganizationId, PermissionResolver, Plan,
//!     ResolutionContext, ResolverConfig, Role,
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(MemoryPermissionStorage::from_seed(catalog::default_seed()));
//! let resolver = PermissionResolver::new(ResolverConfig::default(), storage)?;
//!
//! let ctx = ResolutionContext::new(OrganizationId::new(), Role::Staff).with_plan(Plan::Starter);
//! assert!(resolver.is_allowed(&ctx, "attendance.create").await?);
//! assert!(!resolver.is_allowed(&ctx, "invoices.delete").await?);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod consumers;
pub mod error;
pub mod layers;
pub mod models;
pub mod resolver;
pub mod stats;
pub mod storage;

// Re-export commonly used types
pub use cache::PermissionCache;
pub use config::{DefaultDecision, ResolverConfig, StorageBackend, StorageConfig};
pub use consumers::{PermissionGuard, PermissionSnapshot};
pub use error::{PermissionError, PermissionResult};
pub use layers::{GlobalRoleLayer, OrganizationOverrideLayer, PermissionLayer, PlanPresetLayer};
pub use models::{
    EffectiveEntry, EffectivePermissions, GlobalRolePermission, OrganizationId,
    OrganizationPermission, PermissionKey, PermissionMatrix, PermissionSeed, PermissionSource,
    Plan, PlanPermissionPreset, Resolution, ResolutionContext, Role,
};
pub use resolver::PermissionResolver;
pub use stats::ResolverStats;
pub use storage::{FilePermissionStorage, MemoryPermissionStorage, PermissionStorage};

/// Permission resolver version
pub const RESOLVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize a resolver from configuration
///
/// The memory backend starts from `storage.seed_path` when configured and
/// from [`catalog::default_seed`] otherwise.
pub async fn init_permission_resolver(config: ResolverConfig) -> PermissionResult<PermissionResolver> {
    tracing::info!("Initializing permission resolver v{}", RESOLVER_VERSION);

    config.validate_config()?;
    let storage = storage::from_config(&config.storage, catalog::default_seed()).await?;
    let resolver = PermissionResolver::new(config, storage)?;

    tracing::info!(
        "Permission resolver ready (cache ttl {:?})",
        resolver.config().cache_ttl()
    );
    Ok(resolver)
}
