// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Promo dispatch over a tenant's own session.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use wapulse_config::model::CampaignConfig;
use wapulse_core::{
    ConnectionLink, ContactPool, ContactStore, Jid, OutboundPayload, Promo, PromoId, PromoStore,
    SendResult, TenantId, WapulseError,
};

use crate::context::{CampaignContext, CampaignContexts};
use crate::spintax;

/// Pacing for sequential sends.
#[derive(Debug, Clone)]
pub struct CampaignPacing {
    /// Delay between two consecutive sends. None follows the last one.
    pub delay: RangeInclusive<Duration>,
    /// Enter campaign mode automatically when a sequential send starts.
    pub auto_campaign_mode: bool,
}

impl From<&CampaignConfig> for CampaignPacing {
    fn from(config: &CampaignConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_min_ms)
                ..=Duration::from_millis(config.delay_max_ms.max(config.delay_min_ms)),
            auto_campaign_mode: config.auto_campaign_mode,
        }
    }
}

/// Final tally of a sequential send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignSummary {
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    /// The loop stopped early because the session was no longer connected.
    pub aborted: bool,
}

/// A running sequential send.
pub struct CampaignRun {
    results: mpsc::UnboundedReceiver<SendResult>,
    task: JoinHandle<CampaignSummary>,
}

impl CampaignRun {
    /// Next per-recipient result, or `None` once the run is over.
    pub async fn recv(&mut self) -> Option<SendResult> {
        self.results.recv().await
    }

    /// Waits for the run to finish. Unread results are discarded.
    pub async fn summary(self) -> Result<CampaignSummary, WapulseError> {
        drop(self.results);
        self.task
            .await
            .map_err(|e| WapulseError::Internal(format!("campaign task failed: {e}")))
    }
}

/// Outcome of one delivery attempt.
enum Delivery {
    Sent(SendResult),
    Failed(SendResult),
    /// The send failed because the session was not connected.
    SessionLost(SendResult),
}

impl Delivery {
    fn into_result(self) -> SendResult {
        match self {
            Self::Sent(result) | Self::Failed(result) | Self::SessionLost(result) => result,
        }
    }
}

/// Removes the tenant's running marker when the run ends, however it ends.
struct RunningGuard {
    running: Arc<DashMap<TenantId, ()>>,
    tenant: TenantId,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.remove(&self.tenant);
    }
}

/// Sends promos for tenants.
#[derive(Clone)]
pub struct CampaignDispatcher {
    contacts: Arc<dyn ContactStore>,
    promos: Arc<dyn PromoStore>,
    contexts: Arc<CampaignContexts>,
    pacing: CampaignPacing,
    business_fallback: String,
    running: Arc<DashMap<TenantId, ()>>,
}

impl CampaignDispatcher {
    /// `business_fallback` is the campaign prompt used for tenants that never
    /// stored a default prompt.
    pub fn new(
        contacts: Arc<dyn ContactStore>,
        promos: Arc<dyn PromoStore>,
        contexts: Arc<CampaignContexts>,
        pacing: CampaignPacing,
        business_fallback: impl Into<String>,
    ) -> Self {
        Self {
            contacts,
            promos,
            contexts,
            pacing,
            business_fallback: business_fallback.into(),
            running: Arc::new(DashMap::new()),
        }
    }

    async fn load_promo(&self, tenant: &TenantId, id: PromoId) -> Result<Promo, WapulseError> {
        self.promos
            .get_promo(tenant, id)
            .await?
            .ok_or_else(|| WapulseError::PromoNotFound {
                tenant: tenant.to_string(),
                promo_id: id,
            })
    }

    /// Puts the tenant into campaign mode for `promo_id`.
    pub async fn enter_campaign_mode(
        &self,
        tenant: &TenantId,
        promo_id: PromoId,
    ) -> Result<CampaignContext, WapulseError> {
        let promo = self.load_promo(tenant, promo_id).await?;
        let business = self
            .contacts
            .get_tenant_preferences(tenant)
            .await?
            .and_then(|prefs| prefs.default_prompt)
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or_else(|| self.business_fallback.clone());
        let assistant_prompt = if promo.text.trim().is_empty() {
            business
        } else {
            format!("{business}\n\nCurrent promotion:\n{}", promo.text)
        };
        let context = CampaignContext {
            promo_id,
            promo_text: promo.text,
            assistant_prompt,
        };
        self.contexts.enter(tenant, context.clone());
        info!(tenant = %tenant, promo = %promo_id, "campaign mode entered");
        Ok(context)
    }

    /// Sends one promo to one recipient.
    ///
    /// Fails only if the session is not connected or the promo does not
    /// exist. A failed send is reported in the returned [`SendResult`].
    pub async fn send_one(
        &self,
        tenant: &TenantId,
        link: &dyn ConnectionLink,
        phone: &str,
        promo_id: PromoId,
        pool: ContactPool,
    ) -> Result<SendResult, WapulseError> {
        if !link.state().is_connected() {
            return Err(WapulseError::NotConnected {
                session: tenant.to_string(),
            });
        }
        let promo = self.load_promo(tenant, promo_id).await?;
        Ok(self.deliver(tenant, link, phone, &promo, pool).await.into_result())
    }

    async fn deliver(
        &self,
        tenant: &TenantId,
        link: &dyn ConnectionLink,
        phone: &str,
        promo: &Promo,
        pool: ContactPool,
    ) -> Delivery {
        let text = spintax::expand(&promo.text);
        let image = match &promo.image {
            Some(image_ref) => self.promos.resolve_image(image_ref).await,
            None => None,
        };
        let payload = match image {
            Some(path) => OutboundPayload::Image {
                path,
                caption: text,
            },
            None if !text.is_empty() => OutboundPayload::Text(text),
            None => {
                debug!(tenant = %tenant, promo = %promo.id, "promo has neither text nor a usable image");
                return Delivery::Failed(SendResult::failed(phone, "promo has no content to send"));
            }
        };

        if let Err(e) = link.send(&Jid::from_phone(phone), &payload).await {
            debug!(tenant = %tenant, phone = %phone, error = %e, "promo send failed");
            let lost = matches!(e, WapulseError::NotConnected { .. });
            let result = SendResult::failed(phone, e);
            return if lost {
                Delivery::SessionLost(result)
            } else {
                Delivery::Failed(result)
            };
        }

        let today = Utc::now().date_naive();
        match self.contacts.mark_last_sent(tenant, phone, pool, today).await {
            Ok(true) => {}
            Ok(false) => debug!(tenant = %tenant, phone = %phone, %pool, "recipient is not a stored contact"),
            Err(e) => warn!(tenant = %tenant, phone = %phone, error = %e, "failed to record last-sent date"),
        }
        debug!(tenant = %tenant, phone = %phone, "promo sent");
        Delivery::Sent(SendResult::ok(phone))
    }

    /// Sends the promo to each recipient in order, pausing between sends.
    ///
    /// The loop ends early, without an error, as soon as the session is seen
    /// disconnected, either before a send or through a send failing with
    /// [`WapulseError::NotConnected`]. Remaining recipients are not attempted. One run per
    /// tenant at a time.
    pub async fn send_sequential(
        &self,
        tenant: &TenantId,
        link: Arc<dyn ConnectionLink>,
        recipients: Vec<String>,
        promo_id: PromoId,
        pool: ContactPool,
    ) -> Result<CampaignRun, WapulseError> {
        let guard = match self.running.entry(tenant.clone()) {
            Entry::Occupied(_) => {
                return Err(WapulseError::CampaignAlreadyRunning(tenant.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(());
                RunningGuard {
                    running: Arc::clone(&self.running),
                    tenant: tenant.clone(),
                }
            }
        };

        if !link.state().is_connected() {
            return Err(WapulseError::NotConnected {
                session: tenant.to_string(),
            });
        }
        let promo = self.load_promo(tenant, promo_id).await?;
        if self.pacing.auto_campaign_mode {
            self.enter_campaign_mode(tenant, promo_id).await?;
        }

        let (tx, results) = mpsc::unbounded_channel();
        let dispatcher = self.clone();
        let tenant = tenant.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let summary = dispatcher
                .run_sequential(&tenant, link.as_ref(), &recipients, &promo, pool, tx)
                .await;
            info!(
                tenant = %tenant,
                total = summary.total,
                sent = summary.sent,
                failed = summary.failed,
                aborted = summary.aborted,
                "campaign finished"
            );
            summary
        });

        Ok(CampaignRun { results, task })
    }

    async fn run_sequential(
        &self,
        tenant: &TenantId,
        link: &dyn ConnectionLink,
        recipients: &[String],
        promo: &Promo,
        pool: ContactPool,
        results: mpsc::UnboundedSender<SendResult>,
    ) -> CampaignSummary {
        let mut summary = CampaignSummary {
            total: recipients.len(),
            sent: 0,
            failed: 0,
            aborted: false,
        };
        info!(tenant = %tenant, promo = %promo.id, total = summary.total, "campaign started");

        for (index, phone) in recipients.iter().enumerate() {
            if index > 0 {
                let delay = random_in(&self.pacing.delay);
                debug!(tenant = %tenant, ?delay, "waiting before next send");
                tokio::time::sleep(delay).await;
            }
            if !link.state().is_connected() {
                warn!(tenant = %tenant, remaining = recipients.len() - index, "session disconnected, campaign aborted");
                summary.aborted = true;
                break;
            }

            let delivery = self.deliver(tenant, link, phone, promo, pool).await;
            let lost = matches!(delivery, Delivery::SessionLost(_));
            let result = delivery.into_result();
            if result.success {
                summary.sent += 1;
            } else {
                summary.failed += 1;
            }
            // Keep sending even if nobody is reading the results.
            let _ = results.send(result);
            if lost {
                warn!(tenant = %tenant, remaining = recipients.len() - index - 1, "send failed on a lost session, campaign aborted");
                summary.aborted = true;
                break;
            }
        }
        summary
    }
}

fn random_in(range: &RangeInclusive<Duration>) -> Duration {
    let (lo, hi) = (range.start().as_millis() as u64, range.end().as_millis() as u64);
    if lo >= hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}
