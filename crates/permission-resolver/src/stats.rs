//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Resolver statistics

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Resolver statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolverStats {
    /// Number of permission checks
    pub permission_checks: u64,

    /// Number of permission grants
    pub permission_grants: u64,

    /// Number of permission denials
    pub permission_denials: u64,

    /// Resolutions served from cache
    pub cache_hits: u64,

    /// Resolutions that had to read storage
    pub cache_misses: u64,

    /// Cache invalidations triggered by writes or explicit calls
    pub invalidations: u64,

    /// Last permission check
    pub last_permission_check: Option<DateTime<Utc>>,
}

impl ResolverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a permission check result
    pub fn record_permission_check(&mut self, granted: bool) {
        self.permission_checks += 1;
        self.last_permission_check = Some(Utc::now());
        if granted {
            self.permission_grants += 1;
        } else {
            self.permission_denials += 1;
        }
    }

    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn record_cache_miss(&mut self) {
        self.cache_misses += 1;
    }

    pub fn record_invalidation(&mut self) {
        self.invalidations += 1;
    }

    /// Get permission grant rate
    pub fn grant_rate(&self) -> f64 {
        if self.permission_checks == 0 {
            0.0
        } else {
            self.permission_grants as f64 / self.permission_checks as f64
        }
    }

    /// Share of resolutions served from cache
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}
