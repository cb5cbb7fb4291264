// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session listener wiring inbound messages to the auto-responder and
//! logouts to the tenant data wipe.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use wapulse_campaign::CampaignContexts;
use wapulse_core::{ConnectionLink, ContactStore, InboundEnvelope, TenantId};
use wapulse_session::SessionListener;

use crate::responder::AutoResponder;

pub(crate) struct RuntimeListener {
    pub(crate) responder: Arc<AutoResponder>,
    pub(crate) contexts: Arc<CampaignContexts>,
    pub(crate) contacts: Arc<dyn ContactStore>,
}

#[async_trait]
impl SessionListener for RuntimeListener {
    async fn on_message(
        &self,
        tenant: &TenantId,
        link: Arc<dyn ConnectionLink>,
        envelope: InboundEnvelope,
    ) {
        let outcome = self.responder.handle(tenant, link.as_ref(), &envelope).await;
        tracing::trace!(tenant = %tenant, ?outcome, "inbound message handled");
    }

    async fn on_logged_out(&self, tenant: &TenantId) {
        self.contexts.clear(tenant);
        if let Err(e) = self.contacts.delete_contacts(tenant).await {
            warn!(tenant = %tenant, error = %e, "failed to delete contacts on logout");
            return;
        }
        info!(tenant = %tenant, "tenant data wiped");
    }
}
