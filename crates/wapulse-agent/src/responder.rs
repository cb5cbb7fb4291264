// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-responder gate: decides whether an inbound message gets an AI reply,
//! picks the prompt and sends the reply back to the sender.

use std::sync::Arc;

use tracing::{debug, warn};
use wapulse_campaign::CampaignContexts;
use wapulse_config::model::ResponderConfig;
use wapulse_core::{
    CompletionProvider, ConnectionLink, ContactStore, InboundEnvelope, OutboundPayload, TenantId,
};

/// Why a message was not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skipped {
    FromSelf,
    Group,
    NoText,
    /// The tenant has no stored preferences.
    UnknownTenant,
    Disabled,
}

/// What the gate did with one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderOutcome {
    Skipped(Skipped),
    Replied,
    /// The completion call failed or returned nothing; no reply was sent.
    CompletionFailed,
    SendFailed,
}

/// Answers inbound messages with the tenant's completion provider.
pub struct AutoResponder {
    contacts: Arc<dyn ContactStore>,
    contexts: Arc<CampaignContexts>,
    completion: Arc<dyn CompletionProvider>,
    fallback_prompt: String,
    typing_indicator: bool,
}

impl AutoResponder {
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        contexts: Arc<CampaignContexts>,
        completion: Arc<dyn CompletionProvider>,
        config: &ResponderConfig,
    ) -> Self {
        Self {
            contacts,
            contexts,
            completion,
            fallback_prompt: config.fallback_prompt.clone(),
            typing_indicator: config.typing_indicator,
        }
    }

    /// Handles one inbound message for `tenant`.
    ///
    /// Completion and send failures are logged and swallowed.
    pub async fn handle(
        &self,
        tenant: &TenantId,
        link: &dyn ConnectionLink,
        envelope: &InboundEnvelope,
    ) -> ResponderOutcome {
        if envelope.from_me {
            return ResponderOutcome::Skipped(Skipped::FromSelf);
        }
        if envelope.sender.is_group() {
            return ResponderOutcome::Skipped(Skipped::Group);
        }
        let Some(text) = envelope.content.text() else {
            return ResponderOutcome::Skipped(Skipped::NoText);
        };

        let preferences = match self.contacts.get_tenant_preferences(tenant).await {
            Ok(Some(preferences)) => preferences,
            Ok(None) => return ResponderOutcome::Skipped(Skipped::UnknownTenant),
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "could not load preferences, not replying");
                return ResponderOutcome::Skipped(Skipped::UnknownTenant);
            }
        };
        if !preferences.auto_responder_enabled {
            return ResponderOutcome::Skipped(Skipped::Disabled);
        }

        let prompt = match self.contexts.get(tenant) {
            Some(context) => context.assistant_prompt,
            None => preferences
                .default_prompt
                .filter(|prompt| !prompt.trim().is_empty())
                .unwrap_or_else(|| self.fallback_prompt.clone()),
        };

        if self.typing_indicator {
            if let Err(e) = link.send_typing(&envelope.sender).await {
                debug!(tenant = %tenant, error = %e, "typing indicator failed");
            }
        }

        let reply = match self.completion.complete(&prompt, text).await {
            Ok(reply) if !reply.trim().is_empty() => reply,
            Ok(_) => {
                warn!(tenant = %tenant, "completion returned an empty reply");
                return ResponderOutcome::CompletionFailed;
            }
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "completion failed, not replying");
                return ResponderOutcome::CompletionFailed;
            }
        };

        match link
            .send(&envelope.sender, &OutboundPayload::Text(reply))
            .await
        {
            Ok(()) => {
                debug!(tenant = %tenant, to = %envelope.sender, "auto-reply sent");
                ResponderOutcome::Replied
            }
            Err(e) => {
                warn!(tenant = %tenant, error = %e, "auto-reply send failed");
                ResponderOutcome::SendFailed
            }
        }
    }
}
