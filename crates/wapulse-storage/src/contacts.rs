// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the contact store.

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};
use tracing::debug;
use wapulse_core::{
    AdapterType, ContactPool, ContactRecord, ContactStore, HealthStatus, PluginAdapter, TenantId,
    TenantPreferences, WapulseError,
};

use crate::database::{Database, map_tr_err};

/// Contacts in two pools per tenant, plus per-tenant auto-responder settings.
pub struct SqliteContactStore {
    db: Database,
}

impl SqliteContactStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn pool_name(pool: ContactPool) -> &'static str {
    match pool {
        ContactPool::Saved => "saved",
        ContactPool::Imported => "imported",
    }
}

fn row_to_record(
    owner: &TenantId,
    pool: ContactPool,
    row: &rusqlite::Row<'_>,
) -> rusqlite::Result<ContactRecord> {
    Ok(ContactRecord {
        owner: owner.clone(),
        phone: row.get(0)?,
        name: row.get(1)?,
        pool,
        last_sent: row.get::<_, Option<NaiveDate>>(2)?,
    })
}

#[async_trait]
impl PluginAdapter for SqliteContactStore {
    fn name(&self) -> &str {
        "sqlite-contacts"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, WapulseError> {
        self.db
            .connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WapulseError> {
        self.db.checkpoint().await?;
        debug!("contact store checkpointed");
        Ok(())
    }
}

#[async_trait]
impl ContactStore for SqliteContactStore {
    async fn get_contact(
        &self,
        owner: &TenantId,
        phone: &str,
        pool: ContactPool,
    ) -> Result<Option<ContactRecord>, WapulseError> {
        let owner = owner.clone();
        let phone = phone.to_string();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT phone, name, last_sent FROM contacts
                     WHERE owner = ?1 AND pool = ?2 AND phone = ?3",
                    params![owner.as_str(), pool_name(pool), phone],
                    |row| row_to_record(&owner, pool, row),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn upsert_contact(&self, record: ContactRecord) -> Result<(), WapulseError> {
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO contacts (owner, pool, phone, name, last_sent)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT (owner, pool, phone)
                     DO UPDATE SET name = excluded.name, last_sent = excluded.last_sent",
                    params![
                        record.owner.as_str(),
                        pool_name(record.pool),
                        record.phone,
                        record.name,
                        record.last_sent,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn mark_last_sent(
        &self,
        owner: &TenantId,
        phone: &str,
        pool: ContactPool,
        date: NaiveDate,
    ) -> Result<bool, WapulseError> {
        let owner = owner.clone();
        let phone = phone.to_string();
        let changed = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE contacts SET last_sent = ?1
                     WHERE owner = ?2 AND pool = ?3 AND phone = ?4",
                    params![date, owner.as_str(), pool_name(pool), phone],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(changed > 0)
    }

    async fn list_contacts(
        &self,
        owner: &TenantId,
        pool: ContactPool,
    ) -> Result<Vec<ContactRecord>, WapulseError> {
        let owner = owner.clone();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT phone, name, last_sent FROM contacts
                     WHERE owner = ?1 AND pool = ?2 ORDER BY rowid",
                )?;
                let rows = stmt.query_map(params![owner.as_str(), pool_name(pool)], |row| {
                    row_to_record(&owner, pool, row)
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn import_contacts(
        &self,
        owner: &TenantId,
        phones: &[String],
    ) -> Result<usize, WapulseError> {
        let owner = owner.clone();
        let phones = phones.to_vec();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO contacts (owner, pool, phone) VALUES (?1, 'imported', ?2)",
                    )?;
                    for phone in &phones {
                        inserted += stmt.execute(params![owner.as_str(), phone])?;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete_contacts(&self, owner: &TenantId) -> Result<(), WapulseError> {
        let owner = owner.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute("DELETE FROM contacts WHERE owner = ?1", params![owner.as_str()])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_tenant_preferences(
        &self,
        tenant: &TenantId,
    ) -> Result<Option<TenantPreferences>, WapulseError> {
        let tenant = tenant.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT auto_responder_enabled, default_prompt FROM tenants WHERE tenant_id = ?1",
                    params![tenant.as_str()],
                    |row| {
                        Ok(TenantPreferences {
                            auto_responder_enabled: row.get(0)?,
                            default_prompt: row.get(1)?,
                        })
                    },
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn set_tenant_preferences(
        &self,
        tenant: &TenantId,
        preferences: TenantPreferences,
    ) -> Result<(), WapulseError> {
        let tenant = tenant.clone();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tenants (tenant_id, auto_responder_enabled, default_prompt)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (tenant_id) DO UPDATE SET
                         auto_responder_enabled = excluded.auto_responder_enabled,
                         default_prompt = excluded.default_prompt",
                    params![
                        tenant.as_str(),
                        preferences.auto_responder_enabled,
                        preferences.default_prompt,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}
