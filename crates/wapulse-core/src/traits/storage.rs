// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence collaborators: credential blobs, contacts, preferences and promos.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::WapulseError;
use crate::types::{
    ContactPool, ContactRecord, Promo, PromoId, SessionKey, TenantId, TenantPreferences,
};

/// Durable store for per-session credential blobs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, key: &SessionKey) -> Result<Option<Vec<u8>>, WapulseError>;

    /// Returns only once the blob is durable.
    async fn save(&self, key: &SessionKey, blob: &[u8]) -> Result<(), WapulseError>;

    /// Deleting a missing blob is not an error.
    async fn delete(&self, key: &SessionKey) -> Result<(), WapulseError>;
}

/// Contact and tenant-preference persistence.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn get_contact(
        &self,
        owner: &TenantId,
        phone: &str,
        pool: ContactPool,
    ) -> Result<Option<ContactRecord>, WapulseError>;

    async fn upsert_contact(&self, record: ContactRecord) -> Result<(), WapulseError>;

    /// Stamps the last-sent date. Returns false if no such contact exists.
    async fn mark_last_sent(
        &self,
        owner: &TenantId,
        phone: &str,
        pool: ContactPool,
        date: NaiveDate,
    ) -> Result<bool, WapulseError>;

    async fn list_contacts(
        &self,
        owner: &TenantId,
        pool: ContactPool,
    ) -> Result<Vec<ContactRecord>, WapulseError>;

    /// Inserts phones into the imported pool, ignoring ones already present.
    /// Returns the number of new rows.
    async fn import_contacts(
        &self,
        owner: &TenantId,
        phones: &[String],
    ) -> Result<usize, WapulseError>;

    /// Deletes every contact the tenant owns, in both pools.
    async fn delete_contacts(&self, owner: &TenantId) -> Result<(), WapulseError>;

    /// `None` means the tenant is unknown.
    async fn get_tenant_preferences(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<TenantPreferences>, WapulseError>;

    async fn set_tenant_preferences(
        &self,
        tenant: &TenantId,
        preferences: TenantPreferences,
    ) -> Result<(), WapulseError>;
}

/// Read access to tenants' promos and their media.
#[async_trait]
pub trait PromoStore: Send + Sync {
    async fn list_promos(&self, tenant: &TenantId) -> Result<Vec<Promo>, WapulseError>;

    async fn get_promo(&self, tenant: &TenantId, id: PromoId)
    -> Result<Option<Promo>, WapulseError>;

    /// Resolves an image reference to a readable file, if one exists.
    async fn resolve_image(&self, image_ref: &str) -> Option<PathBuf>;
}
