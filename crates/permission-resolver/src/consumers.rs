//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Consumers of resolved permissions
//!
//! [`PermissionSnapshot`] is a frozen view for conditional rendering.
//! [`PermissionGuard`] enforces checks before a privileged operation runs.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::catalog;
use crate::config::DefaultDecision;
use crate::error::PermissionResult;
use crate::models::{EffectivePermissions, PermissionKey, Resolution, ResolutionContext};
use crate::resolver::PermissionResolver;

/// Frozen permission view for one (organization, role, plan)
#[derive(Debug, Clone)]
pub struct PermissionSnapshot {
    effective: Arc<EffectivePermissions>,
    default_decision: DefaultDecision,
    superuser: bool,
}

impl PermissionSnapshot {
    pub fn new(
        effective: Arc<EffectivePermissions>,
        default_decision: DefaultDecision,
        superuser: bool,
    ) -> Self {
        Self {
            effective,
            default_decision,
            superuser,
        }
    }

    /// Whether the key is allowed; malformed keys are never allowed
    pub fn can(&self, permission_key: &str) -> bool {
        let Ok(key) = PermissionKey::new(permission_key) else {
            return false;
        };
        self.can_key(&key)
    }

    pub fn can_key(&self, key: &PermissionKey) -> bool {
        if self.superuser {
            return true;
        }
        self.effective
            .decision(key)
            .map(|entry| entry.allowed)
            .unwrap_or_else(|| self.default_decision.allows())
    }

    pub fn can_any(&self, permission_keys: &[&str]) -> bool {
        permission_keys.iter().any(|key| self.can(key))
    }

    pub fn can_all(&self, permission_keys: &[&str]) -> bool {
        permission_keys.iter().all(|key| self.can(key))
    }

    /// Explicitly enabled keys, wildcards included
    ///
    /// A superuser is additionally granted every catalog module wildcard.
    pub fn enabled_keys(&self) -> Vec<PermissionKey> {
        let mut keys: BTreeSet<PermissionKey> = self.effective.enabled_keys().cloned().collect();
        if self.superuser {
            keys.extend(catalog::MODULES.iter().map(|m| m.wildcard()));
        }
        keys.into_iter().collect()
    }

    /// Modules with at least one enabled action; every catalog module for a superuser
    pub fn modules(&self) -> BTreeSet<&str> {
        let mut modules: BTreeSet<&str> = self
            .effective
            .enabled_keys()
            .map(|key| key.module())
            .collect();
        if self.superuser {
            modules.extend(catalog::MODULES.iter().map(|m| m.name));
        }
        modules
    }

    pub fn is_superuser(&self) -> bool {
        self.superuser
    }

    pub fn effective(&self) -> &EffectivePermissions {
        &self.effective
    }
}

/// Enforcement point bound to one caller
#[derive(Clone)]
pub struct PermissionGuard {
    resolver: Arc<PermissionResolver>,
    ctx: ResolutionContext,
}

impl PermissionGuard {
    pub fn new(resolver: Arc<PermissionResolver>, ctx: ResolutionContext) -> Self {
        Self { resolver, ctx }
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.ctx
    }

    /// Fail with `PermissionDenied` unless the key is allowed
    pub async fn check(&self, permission_key: &str) -> PermissionResult<()> {
        let result = self.resolver.require(&self.ctx, permission_key).await;
        if let Err(e) = &result {
            if e.is_denied() {
                warn!("{}", e);
            }
        }
        result
    }

    /// Fail unless every key is allowed
    pub async fn check_all(&self, permission_keys: &[&str]) -> PermissionResult<()> {
        for permission_key in permission_keys {
            self.check(permission_key).await?;
        }
        Ok(())
    }

    /// Resolution with provenance, for audit trails
    pub async fn explain(&self, permission_key: &str) -> PermissionResult<Resolution> {
        self.resolver.explain(&self.ctx, permission_key).await
    }

    /// Run `operation` only if the key is allowed
    pub async fn authorize<F, Fut, T>(&self, permission_key: &str, operation: F) -> PermissionResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PermissionResult<T>>,
    {
        self.check(permission_key).await?;
        operation().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::error::PermissionError;
    use crate::models::{
        EffectiveEntry, GlobalRolePermission, OrganizationId, PermissionSeed, PermissionSource,
        Role,
    };
    use crate::storage::MemoryPermissionStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(s: &str) -> PermissionKey {
        PermissionKey::new(s).unwrap()
    }

    fn snapshot(default_decision: DefaultDecision, superuser: bool) -> PermissionSnapshot {
        let ctx = ResolutionContext::new(OrganizationId::new(), Role::Accounts);
        let mut effective = EffectivePermissions::empty(&ctx);
        effective.entries.insert(
            key("invoices.*"),
            EffectiveEntry {
                allowed: true,
                source: PermissionSource::Global,
            },
        );
        effective.entries.insert(
            key("invoices.delete"),
            EffectiveEntry {
                allowed: false,
                source: PermissionSource::Organization,
            },
        );
        effective.entries.insert(
            key("payments.record"),
            EffectiveEntry {
                allowed: true,
                source: PermissionSource::Plan,
            },
        );
        effective.entries.insert(
            key("team.invite"),
            EffectiveEntry {
                allowed: false,
                source: PermissionSource::Global,
            },
        );
        PermissionSnapshot::new(Arc::new(effective), default_decision, superuser)
    }

    #[test]
    fn test_snapshot_gating() {
        let snapshot = snapshot(DefaultDecision::Deny, false);

        assert!(snapshot.can("invoices.create"));
        assert!(!snapshot.can("invoices.delete"));
        assert!(snapshot.can("payments.record"));
        assert!(!snapshot.can("team.invite"));
        assert!(!snapshot.can("reports.view"));
        assert!(!snapshot.can("not a key"));

        assert!(snapshot.can_any(&["team.invite", "payments.record"]));
        assert!(!snapshot.can_all(&["team.invite", "payments.record"]));
    }

    #[test]
    fn test_snapshot_modules_and_keys() {
        let snapshot = snapshot(DefaultDecision::Deny, false);
        let modules: Vec<_> = snapshot.modules().into_iter().collect();
        assert_eq!(modules, vec!["invoices", "payments"]);
        assert_eq!(snapshot.enabled_keys().len(), 2);
    }

    #[test]
    fn test_snapshot_default_and_superuser() {
        assert!(snapshot(DefaultDecision::Allow, false).can("reports.view"));

        let superuser = snapshot(DefaultDecision::Deny, true);
        assert!(superuser.is_superuser());
        assert!(superuser.can("invoices.delete"));
    }

    #[test]
    fn test_superuser_snapshot_lists_whole_catalog() {
        let superuser = snapshot(DefaultDecision::Deny, true);

        let modules = superuser.modules();
        assert_eq!(modules.len(), catalog::MODULES.len());
        assert!(modules.contains("billing"));
        assert!(modules.iter().all(|module| superuser.can(&format!("{module}.view"))));

        let keys = superuser.enabled_keys();
        assert!(keys.contains(&key("billing.*")));
        assert!(keys.contains(&key("payments.record")));
        assert!(keys.iter().all(|key| superuser.can_key(key)));
    }

    fn guard(role: Role) -> PermissionGuard {
        let org = OrganizationId::new();
        let storage = Arc::new(MemoryPermissionStorage::from_seed(PermissionSeed {
            global: vec![GlobalRolePermission {
                role: Role::Accounts,
                permission_key: key("payments.record"),
                enabled: true,
            }],
            ..Default::default()
        }));
        let resolver = Arc::new(PermissionResolver::new(ResolverConfig::default(), storage).unwrap());
        PermissionGuard::new(resolver, ResolutionContext::new(org, role))
    }

    #[tokio::test]
    async fn test_guard_runs_allowed_operation() {
        let guard = guard(Role::Accounts);
        let calls = AtomicUsize::new(0);

        let result = guard
            .authorize("payments.record", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_guard_skips_denied_operation() {
        let guard = guard(Role::Staff);
        let calls = AtomicUsize::new(0);

        let result = guard
            .authorize("payments.record", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(PermissionError::PermissionDenied { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_guard_explain_and_check_all() {
        let guard = guard(Role::Accounts);
        let resolution = guard.explain("payments.record").await.unwrap();
        assert_eq!(resolution.source, PermissionSource::Global);

        assert!(guard.check_all(&["payments.record"]).await.is_ok());
        assert!(guard
            .check_all(&["payments.record", "payments.delete"])
            .await
            .is_err());
    }
}
