//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Permission model definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{PermissionError, PermissionResult};

/// Wildcard action matching every action of a module
pub const WILDCARD_ACTION: &str = "*";

/// Organization (tenant) identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(Uuid);

impl OrganizationId {
    /// Create a new random organization ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrganizationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrganizationId {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| PermissionError::invalid_organization_id(s))
    }
}

/// Role of a member within an organization
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Owner,
    Manager,
    Accounts,
    Staff,
    Custom(String),
}

impl Role {
    /// Built-in roles, highest capability first
    pub const BUILT_IN: [Role; 4] = [Role::Owner, Role::Manager, Role::Accounts, Role::Staff];

    /// Role name as stored in the permission tables
    pub fn as_str(&self) -> &str {
        match self {
            Role::Owner => "owner",
            Role::Manager => "manager",
            Role::Accounts => "accounts",
            Role::Staff => "staff",
            Role::Custom(name) => name,
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        let name = value.trim().to_ascii_lowercase();
        match name.as_str() {
            "owner" => Role::Owner,
            "manager" => Role::Manager,
            "accounts" => Role::Accounts,
            "staff" => Role::Staff,
            _ => Role::Custom(name),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::from(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription plan of an organization
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Plan {
    Free,
    Starter,
    Professional,
    Enterprise,
    Custom(String),
}

impl Plan {
    /// Built-in subscription tiers, cheapest first
    pub const BUILT_IN: [Plan; 4] = [Plan::Free, Plan::Starter, Plan::Professional, Plan::Enterprise];

    /// Plan name as stored in the preset table
    pub fn as_str(&self) -> &str {
        match self {
            Plan::Free => "free",
            Plan::Starter => "starter",
            Plan::Professional => "professional",
            Plan::Enterprise => "enterprise",
            Plan::Custom(name) => name,
        }
    }
}

impl From<&str> for Plan {
    fn from(value: &str) -> Self {
        let name = value.trim().to_ascii_lowercase();
        match name.as_str() {
            "free" => Plan::Free,
            "starter" => Plan::Starter,
            "professional" => Plan::Professional,
            "enterprise" => Plan::Enterprise,
            _ => Plan::Custom(name),
        }
    }
}

impl From<String> for Plan {
    fn from(value: String) -> Self {
        Plan::from(value.as_str())
    }
}

impl From<Plan> for String {
    fn from(plan: Plan) -> Self {
        plan.as_str().to_string()
    }
}

impl FromStr for Plan {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Plan::from(s))
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission key of the form `module.action`
///
/// The action may be `*`, which makes the key a module wildcard covering
/// every action of that module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionKey(String);

impl PermissionKey {
    /// Parse and validate a permission key
    pub fn new(key: impl Into<String>) -> PermissionResult<Self> {
        let key = key.into();
        let Some((module, action)) = key.split_once('.') else {
            return Err(PermissionError::invalid_permission_key(
                &key,
                "expected module.action",
            ));
        };

        if !is_segment(module) {
            return Err(PermissionError::invalid_permission_key(
                &key,
                "module must be non-empty and use [a-z0-9_]",
            ));
        }

        if action != WILDCARD_ACTION && !is_segment(action) {
            return Err(PermissionError::invalid_permission_key(
                &key,
                "action must be '*' or non-empty [a-z0-9_]",
            ));
        }

        Ok(Self(key))
    }

    /// Build a key from catalog parts that are known to be well formed
    pub(crate) fn from_static(module: &str, action: &str) -> Self {
        Self(format!("{}.{}", module, action))
    }

    /// Module wildcard for a module name
    pub fn wildcard(module: &str) -> PermissionResult<Self> {
        Self::new(format!("{}.{}", module, WILDCARD_ACTION))
    }

    /// Module segment
    pub fn module(&self) -> &str {
        self.0.split_once('.').map(|(m, _)| m).unwrap_or(&self.0)
    }

    /// Action segment
    pub fn action(&self) -> &str {
        self.0.split_once('.').map(|(_, a)| a).unwrap_or_default()
    }

    /// Whether this key is a module wildcard
    pub fn is_wildcard(&self) -> bool {
        self.action() == WILDCARD_ACTION
    }

    /// The module wildcard covering this key, if this key is concrete
    pub fn wildcard_for(&self) -> Option<PermissionKey> {
        if self.is_wildcard() {
            None
        } else {
            Some(Self::from_static(self.module(), WILDCARD_ACTION))
        }
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl TryFrom<String> for PermissionKey {
    type Error = PermissionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PermissionKey> for String {
    fn from(key: PermissionKey) -> Self {
        key.0
    }
}

impl FromStr for PermissionKey {
    type Err = PermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Enabled flags for one role within one permission source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMatrix(BTreeMap<PermissionKey, bool>);

impl PermissionMatrix {
    /// Create an empty matrix
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a flag
    pub fn set(&mut self, key: PermissionKey, enabled: bool) {
        self.0.insert(key, enabled);
    }

    /// Remove a flag
    pub fn remove(&mut self, key: &PermissionKey) -> Option<bool> {
        self.0.remove(key)
    }

    /// Look up a key: the exact entry wins over the module wildcard
    pub fn lookup(&self, key: &PermissionKey) -> Option<bool> {
        if let Some(enabled) = self.0.get(key) {
            return Some(*enabled);
        }

        key.wildcard_for()
            .and_then(|wildcard| self.0.get(&wildcard).copied())
    }

    /// Iterate over the explicit entries
    pub fn iter(&self) -> impl Iterator<Item = (&PermissionKey, &bool)> {
        self.0.iter()
    }

    /// Explicit keys in this matrix
    pub fn keys(&self) -> impl Iterator<Item = &PermissionKey> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(PermissionKey, bool)> for PermissionMatrix {
    fn from_iter<T: IntoIterator<Item = (PermissionKey, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Global default: `(role, permission_key) -> enabled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalRolePermission {
    pub role: Role,
    pub permission_key: PermissionKey,
    pub enabled: bool,
}

/// Plan preset: `(plan, role, permission_key) -> enabled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPermissionPreset {
    pub plan: Plan,
    pub role: Role,
    pub permission_key: PermissionKey,
    pub enabled: bool,
}

/// Organization override: `(organization_id, role, permission_key) -> enabled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationPermission {
    pub organization_id: OrganizationId,
    pub role: Role,
    pub permission_key: PermissionKey,
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl OrganizationPermission {
    pub fn new(
        organization_id: OrganizationId,
        role: Role,
        permission_key: PermissionKey,
        enabled: bool,
    ) -> Self {
        Self {
            organization_id,
            role,
            permission_key,
            enabled,
            updated_at: Utc::now(),
        }
    }
}

/// Serialized form of the three permission tables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionSeed {
    /// Global role defaults
    pub global: Vec<GlobalRolePermission>,
    /// Plan presets
    pub plans: Vec<PlanPermissionPreset>,
    /// Organization-specific overrides
    pub organizations: Vec<OrganizationPermission>,
}

impl PermissionSeed {
    /// Parse a JSON seed document
    pub fn from_json_str(content: &str) -> PermissionResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse a TOML seed document
    pub fn from_toml_str(content: &str) -> PermissionResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a seed document, choosing the format from the file extension
    pub fn from_file(path: &Path) -> PermissionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PermissionError::storage_error(format!(
                "Failed to read seed file {}: {}",
                path.display(),
                e
            ))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    /// Render as pretty JSON
    pub fn to_json_pretty(&self) -> PermissionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> PermissionResult<String> {
        toml::to_string_pretty(self).map_err(|e| PermissionError::serialization_error(e.to_string()))
    }

    /// Total number of rows across all tables
    pub fn len(&self) -> usize {
        self.global.len() + self.plans.len() + self.organizations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where a resolved decision came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionSource {
    /// Organization-specific override
    Organization,
    /// Subscription plan preset
    Plan,
    /// Global role default
    Global,
    /// Role bypasses the matrix entirely
    Superuser,
    /// No source had an entry; the configured default applied
    Default,
}

impl fmt::Display for PermissionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PermissionSource::Organization => "organization",
            PermissionSource::Plan => "plan",
            PermissionSource::Global => "global",
            PermissionSource::Superuser => "superuser",
            PermissionSource::Default => "default",
        };
        f.write_str(name)
    }
}

/// Who is asking: the organization, the member's role, and the organization's plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolutionContext {
    pub organization_id: OrganizationId,
    pub role: Role,
    pub plan: Option<Plan>,
}

impl ResolutionContext {
    pub fn new(organization_id: OrganizationId, role: Role) -> Self {
        Self {
            organization_id,
            role,
            plan: None,
        }
    }

    pub fn with_plan(mut self, plan: Plan) -> Self {
        self.plan = Some(plan);
        self
    }
}

/// A single resolved entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveEntry {
    pub allowed: bool,
    pub source: PermissionSource,
}

/// Merged view of every key known to any source, resolved by precedence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectivePermissions {
    pub organization_id: OrganizationId,
    pub role: Role,
    pub plan: Option<Plan>,
    pub entries: BTreeMap<PermissionKey, EffectiveEntry>,
    pub resolved_at: DateTime<Utc>,
}

impl EffectivePermissions {
    /// Create an empty view for a context
    pub fn empty(ctx: &ResolutionContext) -> Self {
        Self {
            organization_id: ctx.organization_id,
            role: ctx.role.clone(),
            plan: ctx.plan.clone(),
            entries: BTreeMap::new(),
            resolved_at: Utc::now(),
        }
    }

    /// Decision for a key: the exact entry wins over the module wildcard
    pub fn decision(&self, key: &PermissionKey) -> Option<EffectiveEntry> {
        if let Some(entry) = self.entries.get(key) {
            return Some(*entry);
        }

        key.wildcard_for()
            .and_then(|wildcard| self.entries.get(&wildcard).copied())
    }

    /// Explicitly enabled keys
    pub fn enabled_keys(&self) -> impl Iterator<Item = &PermissionKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.allowed)
            .map(|(key, _)| key)
    }
}

/// Outcome of a single permission check with its provenance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub permission_key: PermissionKey,
    pub allowed: bool,
    pub source: PermissionSource,
}
