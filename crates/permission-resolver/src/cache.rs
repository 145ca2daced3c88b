//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Short-lived cache of resolved permissions keyed by (organization, role)

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{EffectivePermissions, OrganizationId, Plan, Role};

type CacheKey = (OrganizationId, Role);

#[derive(Debug, Clone)]
struct CachedPermissions {
    effective: Arc<EffectivePermissions>,
    plan: Option<Plan>,
    cached_at: Instant,
}

/// Permission cache
///
/// Every invalidation advances a generation counter. A fill started under an
/// older generation is discarded, so a view read before a write never lands
/// after that write's invalidation.
#[derive(Debug)]
pub struct PermissionCache {
    ttl: Duration,
    max_entries: usize,
    generation: AtomicU64,
    entries: RwLock<HashMap<CacheKey, CachedPermissions>>,
}

impl PermissionCache {
    /// Create a cache; a zero TTL disables caching
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            generation: AtomicU64::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current generation; capture before reading the sources of a fill
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Fetch a live entry resolved under the same plan
    pub async fn get(
        &self,
        organization_id: &OrganizationId,
        role: &Role,
        plan: Option<&Plan>,
    ) -> Option<Arc<EffectivePermissions>> {
        if !self.is_enabled() {
            return None;
        }

        let key = (*organization_id, role.clone());
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                None => return None,
                Some(cached) if self.is_fresh(cached) && cached.plan.as_ref() == plan => {
                    return Some(cached.effective.clone());
                }
                Some(_) => {}
            }
        }

        // Stale or resolved under another plan
        let mut entries = self.entries.write().await;
        if let Some(cached) = entries.get(&key) {
            if !self.is_fresh(cached) || cached.plan.as_ref() != plan {
                entries.remove(&key);
                debug!(
                    "Evicted cached permissions for {}/{}",
                    organization_id, role
                );
            }
        }
        None
    }

    /// Store a view resolved under `generation`
    ///
    /// Returns false when caching is disabled or an invalidation happened
    /// since `generation` was captured.
    pub async fn insert(&self, effective: Arc<EffectivePermissions>, generation: u64) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let key = (effective.organization_id, effective.role.clone());
        let mut entries = self.entries.write().await;

        if self.generation() != generation {
            debug!(
                "Discarded stale fill for {}/{}",
                effective.organization_id, effective.role
            );
            return false;
        }

        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, cached)| cached.cached_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key,
            CachedPermissions {
                plan: effective.plan.clone(),
                effective,
                cached_at: Instant::now(),
            },
        );
        true
    }

    /// Drop the entry for one (organization, role)
    pub async fn invalidate(&self, organization_id: &OrganizationId, role: &Role) -> bool {
        self.advance();
        let mut entries = self.entries.write().await;
        entries.remove(&(*organization_id, role.clone())).is_some()
    }

    /// Drop every entry for an organization
    pub async fn invalidate_organization(&self, organization_id: &OrganizationId) -> usize {
        self.advance();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(org, _), _| org != organization_id);
        before - entries.len()
    }

    /// Drop everything
    pub async fn invalidate_all(&self) -> usize {
        self.advance();
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        removed
    }

    /// Remove expired entries
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, cached| cached.cached_at.elapsed() < ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    // Must happen before entries are removed
    fn advance(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_fresh(&self, cached: &CachedPermissions) -> bool {
        cached.cached_at.elapsed() < self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResolutionContext;

    fn effective(org: OrganizationId, role: Role, plan: Option<Plan>) -> Arc<EffectivePermissions> {
        let mut ctx = ResolutionContext::new(org, role);
        ctx.plan = plan;
        Arc::new(EffectivePermissions::empty(&ctx))
    }

    #[tokio::test]
    async fn test_hit_requires_same_plan() {
        let cache = PermissionCache::new(Duration::from_secs(60), 16);
        let org = OrganizationId::new();
        cache.insert(effective(org, Role::Staff, Some(Plan::Free)), cache.generation()).await;

        assert!(cache.get(&org, &Role::Staff, Some(&Plan::Free)).await.is_some());
        assert!(cache.get(&org, &Role::Manager, Some(&Plan::Free)).await.is_none());

        // Plan upgrade makes the entry unusable and evicts it
        assert!(cache
            .get(&org, &Role::Staff, Some(&Plan::Professional))
            .await
            .is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let cache = PermissionCache::new(Duration::from_millis(20), 16);
        let org = OrganizationId::new();
        cache.insert(effective(org, Role::Staff, None), cache.generation()).await;
        assert!(cache.get(&org, &Role::Staff, None).await.is_some());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&org, &Role::Staff, None).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = PermissionCache::new(Duration::from_millis(20), 16);
        cache.insert(effective(OrganizationId::new(), Role::Staff, None), cache.generation()).await;
        cache.insert(effective(OrganizationId::new(), Role::Owner, None), cache.generation()).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.purge_expired().await, 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let cache = PermissionCache::new(Duration::ZERO, 16);
        let org = OrganizationId::new();
        cache.insert(effective(org, Role::Staff, None), cache.generation()).await;
        assert!(!cache.is_enabled());
        assert!(cache.get(&org, &Role::Staff, None).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = PermissionCache::new(Duration::from_secs(60), 2);
        let first = OrganizationId::new();
        let second = OrganizationId::new();
        let third = OrganizationId::new();

        cache.insert(effective(first, Role::Staff, None), cache.generation()).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert(effective(second, Role::Staff, None), cache.generation()).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.insert(effective(third, Role::Staff, None), cache.generation()).await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&first, &Role::Staff, None).await.is_none());
        assert!(cache.get(&second, &Role::Staff, None).await.is_some());
        assert!(cache.get(&third, &Role::Staff, None).await.is_some());
    }

    #[tokio::test]
    async fn test_invalidation_scopes() {
        let cache = PermissionCache::new(Duration::from_secs(60), 16);
        let org = OrganizationId::new();
        let other = OrganizationId::new();
        cache.insert(effective(org, Role::Staff, None), cache.generation()).await;
        cache.insert(effective(org, Role::Manager, None), cache.generation()).await;
        cache.insert(effective(other, Role::Staff, None), cache.generation()).await;

        assert!(cache.invalidate(&org, &Role::Staff).await);
        assert!(!cache.invalidate(&org, &Role::Staff).await);
        assert_eq!(cache.invalidate_organization(&org).await, 1);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.invalidate_all().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_fill_started_before_invalidation_is_discarded() {
        let cache = PermissionCache::new(Duration::from_secs(60), 16);
        let org = OrganizationId::new();

        let generation = cache.generation();
        cache.invalidate(&org, &Role::Staff).await;

        assert!(!cache.insert(effective(org, Role::Staff, None), generation).await);
        assert!(cache.get(&org, &Role::Staff, None).await.is_none());

        assert!(cache
            .insert(effective(org, Role::Staff, None), cache.generation())
            .await);
        assert!(cache.get(&org, &Role::Staff, None).await.is_some());
    }
}
