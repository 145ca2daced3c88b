//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Error handling for permission resolution

use thiserror::Error;

/// Permission resolution result type
pub type PermissionResult<T> = Result<T, PermissionError>;

/// Permission resolution error types
#[derive(Error, Debug)]
pub enum PermissionError {
    #[error("Permission denied: {permission_key} for role {role} in organization {organization_id}")]
    PermissionDenied {
        organization_id: String,
        role: String,
        permission_key: String,
    },

    #[error(
        "None of [{}] granted for role {role} in organization {organization_id}",
        .permission_keys.join(", ")
    )]
    NoPermissionGranted {
        organization_id: String,
        role: String,
        permission_keys: Vec<String>,
    },

    #[error("Invalid permission key: {key} ({reason})")]
    InvalidPermissionKey { key: String, reason: String },

    #[error("Invalid organization ID: {organization_id}")]
    InvalidOrganizationId { organization_id: String },

    #[error("Permission not found: {permission_key}")]
    PermissionNotFound { permission_key: String },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Serialization error: {message}")]
    SerializationError { message: String },
}

impl PermissionError {
    /// Create a permission denied error
    pub fn permission_denied(
        organization_id: impl Into<String>,
        role: impl Into<String>,
        permission_key: impl Into<String>,
    ) -> Self {
        Self::PermissionDenied {
            organization_id: organization_id.into(),
            role: role.into(),
            permission_key: permission_key.into(),
        }
    }

    /// Create an error for a check where none of the alternatives was allowed
    pub fn no_permission_granted(
        organization_id: impl Into<String>,
        role: impl Into<String>,
        permission_keys: Vec<String>,
    ) -> Self {
        Self::NoPermissionGranted {
            organization_id: organization_id.into(),
            role: role.into(),
            permission_keys,
        }
    }

    /// Create an invalid permission key error
    pub fn invalid_permission_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPermissionKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid organization ID error
    pub fn invalid_organization_id(organization_id: impl Into<String>) -> Self {
        Self::InvalidOrganizationId {
            organization_id: organization_id.into(),
        }
    }

    /// Create a permission not found error
    pub fn permission_not_found(permission_key: impl Into<String>) -> Self {
        Self::PermissionNotFound {
            permission_key: permission_key.into(),
        }
    }

    /// Create a storage error
    pub fn storage_error(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization_error(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Whether this error is an authorization failure rather than an operational fault
    pub fn is_denied(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. } | Self::NoPermissionGranted { .. }
        )
    }
}

impl From<serde_json::Error> for PermissionError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(err.to_string())
    }
}

impl From<toml::de::Error> for PermissionError {
    fn from(err: toml::de::Error) -> Self {
        Self::serialization_error(err.to_string())
    }
}

impl From<validator::ValidationErrors> for PermissionError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::configuration_error(err.to_string())
    }
}

impl From<config::ConfigError> for PermissionError {
    fn from(err: config::ConfigError) -> Self {
        Self::configuration_error(err.to_string())
    }
}
