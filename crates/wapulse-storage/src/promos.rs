// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only promo store backed by per-tenant `promos.json` files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;
use wapulse_core::{Promo, PromoId, PromoStore, TenantId, WapulseError};

/// Reads `<promos_dir>/user_<tenant>/promos.json` and resolves images in `media_dir`.
pub struct JsonPromoStore {
    promos_dir: PathBuf,
    media_dir: PathBuf,
}

impl JsonPromoStore {
    /// `promos_dir` holds one `user_<id>/promos.json` per tenant; promo images
    /// are resolved against `media_dir`.
    pub fn new(promos_dir: impl Into<PathBuf>, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            promos_dir: promos_dir.into(),
            media_dir: media_dir.into(),
        }
    }

    /// Path of the tenant's promo list. The file may not exist yet.
    pub fn promos_file(&self, tenant: &TenantId) -> PathBuf {
        self.promos_dir
            .join(format!("user_{tenant}"))
            .join("promos.json")
    }
}

#[async_trait]
impl PromoStore for JsonPromoStore {
    async fn list_promos(&self, tenant: &TenantId) -> Result<Vec<Promo>, WapulseError> {
        let path = self.promos_file(tenant);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WapulseError::storage(e)),
        };
        serde_json::from_slice(&raw).map_err(WapulseError::storage)
    }

    async fn get_promo(
        &self,
        tenant: &TenantId,
        id: PromoId,
    ) -> Result<Option<Promo>, WapulseError> {
        Ok(self
            .list_promos(tenant)
            .await?
            .into_iter()
            .find(|p| p.id == id))
    }

    async fn resolve_image(&self, image_ref: &str) -> Option<PathBuf> {
        // Only the final component is honoured so a reference cannot leave media_dir.
        let name = Path::new(image_ref).file_name()?;
        let path = self.media_dir.join(name);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            Ok(false) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "promo image not readable");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    async fn fixture() -> (tempfile::TempDir, JsonPromoStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonPromoStore::new(dir.path().join("user_data"), dir.path().join("media"));
        let file = store.promos_file(&tenant("7"));
        tokio::fs::create_dir_all(file.parent().unwrap()).await.unwrap();
        tokio::fs::write(
            &file,
            r#"[{"id": 1, "text": "{Hi|Hello} there", "image": null},
                {"id": 2, "text": "", "image": "sale.png"}]"#,
        )
        .await
        .unwrap();
        tokio::fs::create_dir_all(dir.path().join("media")).await.unwrap();
        tokio::fs::write(dir.path().join("media/sale.png"), b"png").await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn lists_and_finds_promos() {
        let (_dir, store) = fixture().await;
        let promos = store.list_promos(&tenant("7")).await.unwrap();
        assert_eq!(promos.len(), 2);
        let promo = store.get_promo(&tenant("7"), PromoId(2)).await.unwrap().unwrap();
        assert_eq!(promo.image.as_deref(), Some("sale.png"));
        assert!(store.get_promo(&tenant("7"), PromoId(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_means_no_promos() {
        let (_dir, store) = fixture().await;
        assert!(store.list_promos(&tenant("8")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolves_only_existing_images_inside_media_dir() {
        let (_dir, store) = fixture().await;
        assert!(store.resolve_image("sale.png").await.is_some());
        assert!(store.resolve_image("../media/sale.png").await.is_some());
        assert!(store.resolve_image("missing.png").await.is_none());
        assert!(store.resolve_image("..").await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let (_dir, store) = fixture().await;
        tokio::fs::write(store.promos_file(&tenant("7")), b"not json").await.unwrap();
        assert!(matches!(
            store.list_promos(&tenant("7")).await,
            Err(WapulseError::Storage { .. })
        ));
    }
}
