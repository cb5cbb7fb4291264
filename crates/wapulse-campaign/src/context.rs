// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant campaign mode.

use dashmap::DashMap;
use wapulse_core::{PromoId, TenantId};

/// What the auto-responder uses while a tenant is in campaign mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignContext {
    pub promo_id: PromoId,
    pub promo_text: String,
    pub assistant_prompt: String,
}

/// Active campaign contexts, keyed by tenant.
#[derive(Default)]
pub struct CampaignContexts {
    active: DashMap<TenantId, CampaignContext>,
}

impl CampaignContexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters campaign mode, replacing any previous context for the tenant.
    pub fn enter(&self, tenant: &TenantId, context: CampaignContext) {
        self.active.insert(tenant.clone(), context);
    }

    pub fn get(&self, tenant: &TenantId) -> Option<CampaignContext> {
        self.active.get(tenant).map(|entry| entry.value().clone())
    }

    /// Leaves campaign mode. Returns false if the tenant was not in it.
    pub fn clear(&self, tenant: &TenantId) -> bool {
        self.active.remove(tenant).is_some()
    }
}
