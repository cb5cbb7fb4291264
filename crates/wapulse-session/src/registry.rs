// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-entry registry of tenant session handles.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use wapulse_core::{ConnectionLink, TenantId};

use crate::handle::SessionHandle;

/// Result of [`SessionRegistry::claim`].
pub(crate) enum Claim {
    /// A connected handle already exists and was left in place.
    Existing(Arc<SessionHandle>),
    /// A new handle was installed, possibly replacing a stale one.
    Created {
        handle: Arc<SessionHandle>,
        replaced: Option<Arc<SessionHandle>>,
    },
}

/// Maps tenant ids to their one live handle.
///
/// Check-and-set happens under the map's entry lock, so two concurrent starts
/// for the same tenant cannot both install a handle.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    entries: DashMap<TenantId, Arc<SessionHandle>>,
}

impl SessionRegistry {
    /// Returns the existing handle if it is connected, otherwise installs the
    /// one built by `create`. `create` runs under the entry lock and must not
    /// touch the registry.
    pub(crate) fn claim(
        &self,
        tenant: &TenantId,
        create: impl FnOnce() -> Arc<SessionHandle>,
    ) -> Claim {
        match self.entries.entry(tenant.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().state().is_connected() {
                    return Claim::Existing(Arc::clone(entry.get()));
                }
                let handle = create();
                let replaced = entry.insert(Arc::clone(&handle));
                Claim::Created {
                    handle,
                    replaced: Some(replaced),
                }
            }
            Entry::Vacant(entry) => {
                let handle = create();
                entry.insert(Arc::clone(&handle));
                Claim::Created {
                    handle,
                    replaced: None,
                }
            }
        }
    }

    pub(crate) fn get(&self, tenant: &TenantId) -> Option<Arc<SessionHandle>> {
        self.entries.get(tenant).map(|h| Arc::clone(h.value()))
    }

    pub(crate) fn remove(&self, tenant: &TenantId) -> Option<Arc<SessionHandle>> {
        self.entries.remove(tenant).map(|(_, handle)| handle)
    }

    /// Removes the entry only if it still holds `handle`.
    pub(crate) fn remove_exact(&self, tenant: &TenantId, handle: &Arc<SessionHandle>) -> bool {
        self.entries
            .remove_if(tenant, |_, current| Arc::ptr_eq(current, handle))
            .is_some()
    }

    pub(crate) fn tenants(&self) -> Vec<TenantId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use wapulse_core::{ConnectionState, SessionKey};

    fn tenant() -> TenantId {
        TenantId::parse("1").unwrap()
    }

    fn make() -> Arc<SessionHandle> {
        SessionHandle::new(SessionKey::Tenant(tenant()), 4, CancellationToken::new()).0
    }

    #[test]
    fn connected_handle_is_kept() {
        let registry = SessionRegistry::default();
        let first = make();
        first.set_state(ConnectionState::Connected);
        let first_clone = Arc::clone(&first);
        assert!(matches!(
            registry.claim(&tenant(), move || first_clone),
            Claim::Created { replaced: None, .. }
        ));

        match registry.claim(&tenant(), make) {
            Claim::Existing(handle) => assert!(Arc::ptr_eq(&handle, &first)),
            Claim::Created { .. } => panic!("connected handle must not be replaced"),
        }
    }

    #[test]
    fn stale_handle_is_replaced() {
        let registry = SessionRegistry::default();
        let first = make();
        let first_clone = Arc::clone(&first);
        registry.claim(&tenant(), move || first_clone);

        match registry.claim(&tenant(), make) {
            Claim::Created {
                handle,
                replaced: Some(old),
            } => {
                assert!(Arc::ptr_eq(&old, &first));
                assert!(Arc::ptr_eq(&registry.get(&tenant()).unwrap(), &handle));
            }
            _ => panic!("awaiting-scan handle must be replaced"),
        }
    }

    #[test]
    fn remove_exact_ignores_replacement() {
        let registry = SessionRegistry::default();
        let old = make();
        let old_clone = Arc::clone(&old);
        registry.claim(&tenant(), move || old_clone);
        registry.claim(&tenant(), make);
        assert!(!registry.remove_exact(&tenant(), &old));
        assert_eq!(registry.tenants(), vec![tenant()]);
    }
}
