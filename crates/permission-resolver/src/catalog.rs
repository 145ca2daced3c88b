//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Built-in permission catalog and stock permission tables

use serde::Serialize;

use crate::models::{
    GlobalRolePermission, PermissionKey, PermissionSeed, Plan, PlanPermissionPreset, Role,
    WILDCARD_ACTION,
};

const CRUD: [&str; 4] = ["view", "create", "edit", "delete"];

/// A gated business module and its actions
#[derive(Debug, Clone, Serialize)]
pub struct ModuleDefinition {
    pub name: &'static str,
    pub label: &'static str,
    pub actions: &'static [&'static str],
}

impl ModuleDefinition {
    /// Concrete permission keys of this module
    pub fn keys(&self) -> impl Iterator<Item = PermissionKey> + '_ {
        self.actions
            .iter()
            .map(move |action| PermissionKey::from_static(self.name, action))
    }

    /// Module wildcard key
    pub fn wildcard(&self) -> PermissionKey {
        PermissionKey::from_static(self.name, WILDCARD_ACTION)
    }

    pub fn has_action(&self, action: &str) -> bool {
        action == WILDCARD_ACTION || self.actions.contains(&action)
    }
}

/// Modules gated by the permission system
pub const MODULES: &[ModuleDefinition] = &[
    ModuleDefinition {
        name: "dashboard",
        label: "Dashboard",
        actions: &["view"],
    },
    ModuleDefinition {
        name: "invoices",
        label: "Invoices",
        actions: &["view", "create", "edit", "delete", "send", "export"],
    },
    ModuleDefinition {
        name: "quotations",
        label: "Quotations",
        actions: &["view", "create", "edit", "delete", "send", "convert"],
    },
    ModuleDefinition {
        name: "customers",
        label: "Customers",
        actions: &CRUD,
    },
    ModuleDefinition {
        name: "vendors",
        label: "Vendors",
        actions: &CRUD,
    },
    ModuleDefinition {
        name: "vendor_bills",
        label: "Vendor bills",
        actions: &["view", "create", "edit", "delete", "approve"],
    },
    ModuleDefinition {
        name: "payments",
        label: "Payments",
        actions: &["view", "record", "delete"],
    },
    ModuleDefinition {
        name: "attendance",
        label: "Attendance",
        actions: &["view", "create", "edit", "approve"],
    },
    ModuleDefinition {
        name: "team",
        label: "Team",
        actions: &["view", "invite", "edit", "remove"],
    },
    ModuleDefinition {
        name: "reports",
        label: "Reports",
        actions: &["view", "export"],
    },
    ModuleDefinition {
        name: "settings",
        label: "Settings",
        actions: &["view", "manage"],
    },
    ModuleDefinition {
        name: "billing",
        label: "Subscription billing",
        actions: &["view", "manage"],
    },
];

/// Look up a module by name
pub fn module(name: &str) -> Option<&'static ModuleDefinition> {
    MODULES.iter().find(|m| m.name == name)
}

/// Whether the key names a catalog module and one of its actions (or its wildcard)
pub fn is_known(key: &PermissionKey) -> bool {
    module(key.module()).is_some_and(|m| m.has_action(key.action()))
}

/// Every concrete key in the catalog
pub fn all_permission_keys() -> Vec<PermissionKey> {
    MODULES.iter().flat_map(|m| m.keys()).collect()
}

fn grant(role: Role, module: &str, action: &str, enabled: bool) -> GlobalRolePermission {
    GlobalRolePermission {
        role,
        permission_key: PermissionKey::from_static(module, action),
        enabled,
    }
}

fn restrict(plan: Plan, role: Role, module: &str, action: &str) -> PlanPermissionPreset {
    PlanPermissionPreset {
        plan,
        role,
        permission_key: PermissionKey::from_static(module, action),
        enabled: false,
    }
}

/// Stock global matrix and plan presets
pub fn default_seed() -> PermissionSeed {
    let mut global = Vec::new();

    for m in MODULES {
        global.push(grant(Role::Owner, m.name, WILDCARD_ACTION, true));
    }

    for m in MODULES.iter().filter(|m| m.name != "billing") {
        global.push(grant(Role::Manager, m.name, WILDCARD_ACTION, true));
    }
    global.push(grant(Role::Manager, "settings", "manage", false));

    for name in ["invoices", "quotations", "customers", "vendors", "vendor_bills", "payments"] {
        global.push(grant(Role::Accounts, name, WILDCARD_ACTION, true));
    }
    global.push(grant(Role::Accounts, "dashboard", "view", true));
    global.push(grant(Role::Accounts, "reports", "view", true));
    global.push(grant(Role::Accounts, "reports", "export", true));
    global.push(grant(Role::Accounts, "attendance", "view", true));
    global.push(grant(Role::Accounts, "vendor_bills", "approve", false));

    global.push(grant(Role::Staff, "dashboard", "view", true));
    global.push(grant(Role::Staff, "attendance", "view", true));
    global.push(grant(Role::Staff, "attendance", "create", true));

    let mut plans = Vec::new();
    for role in Role::BUILT_IN {
        plans.push(restrict(Plan::Free, role.clone(), "reports", WILDCARD_ACTION));
        plans.push(restrict(Plan::Free, role.clone(), "vendor_bills", WILDCARD_ACTION));
        plans.push(restrict(Plan::Free, role.clone(), "team", "invite"));
        plans.push(restrict(Plan::Starter, role, "reports", "export"));
    }

    PermissionSeed {
        global,
        plans,
        organizations: Vec::new(),
    }
}
