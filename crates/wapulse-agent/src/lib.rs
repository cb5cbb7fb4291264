// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Wapulse runtime: every operation a client can request, wired across
//! the session supervisor, the filter engine, the campaign dispatcher and the
//! auto-responder.
//!
//! Long-running work (filter jobs, sequential campaigns) is started here and
//! reported to the tenant's observer as it progresses.

pub mod responder;
pub mod shutdown;

mod listener;

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use wapulse_campaign::{CampaignContext, CampaignContexts, CampaignDispatcher, CampaignPacing};
use wapulse_config::WapulseConfig;
use wapulse_core::{
    CompletionProvider, ConnectionLink, ConnectionState, ContactPool, ContactStore, Observer,
    ObserverEvent, ObserverId, Promo, PromoId, PromoStore, ProtocolConnector, SendResult,
    SessionStore, TenantId, TenantPreferences, WapulseError,
};
use wapulse_filter::{FilterEngine, FilterEvent, FilterJob, FilterPacing, normalize_numbers};
use wapulse_session::{Supervisor, SupervisorConfig};

pub use responder::{AutoResponder, ResponderOutcome, Skipped};

use crate::listener::RuntimeListener;

/// System prompt used to turn plain promo text into spintax.
pub const SPINTAX_PROMPT: &str = "You are a copywriter. Rewrite the user's promotional message \
as spintax: wrap interchangeable words and phrases in {option one|option two|option three} \
groups without nesting braces. Keep the meaning, the language and any links unchanged. \
Reply with the spintax text only.";

/// Adapters the runtime is built from.
pub struct RuntimeDeps {
    pub connector: Arc<dyn ProtocolConnector>,
    pub sessions: Arc<dyn SessionStore>,
    pub contacts: Arc<dyn ContactStore>,
    pub promos: Arc<dyn PromoStore>,
    /// Answers inbound messages.
    pub completion: Arc<dyn CompletionProvider>,
    /// Generates spintax from plain promo text.
    pub spintax: Arc<dyn CompletionProvider>,
    pub observer: Arc<dyn Observer>,
}

/// Who a sequential send goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    /// An explicit list, stamped against contacts in `pool`.
    Phones { phones: Vec<String>, pool: ContactPool },
    /// Every contact stored in the pool, in insertion order.
    Pool(ContactPool),
}

/// Owns the supervisor, the filter engine and the dispatcher for the process.
pub struct Runtime {
    supervisor: Supervisor,
    filter: FilterEngine,
    dispatcher: CampaignDispatcher,
    contacts: Arc<dyn ContactStore>,
    promos: Arc<dyn PromoStore>,
    completion: Arc<dyn CompletionProvider>,
    spintax: Arc<dyn CompletionProvider>,
    observer: Arc<dyn Observer>,
    min_digits: usize,
    tasks: TaskTracker,
}

impl Runtime {
    pub fn new(config: &WapulseConfig, deps: RuntimeDeps) -> Self {
        let contexts = Arc::new(CampaignContexts::new());
        let responder = Arc::new(AutoResponder::new(
            Arc::clone(&deps.contacts),
            Arc::clone(&contexts),
            Arc::clone(&deps.completion),
            &config.responder,
        ));
        let listener = Arc::new(RuntimeListener {
            responder,
            contexts: Arc::clone(&contexts),
            contacts: Arc::clone(&deps.contacts),
        });
        let supervisor = Supervisor::new(
            deps.connector,
            deps.sessions,
            Arc::clone(&deps.observer),
            listener,
            SupervisorConfig::from(&config.sessions),
        );
        let filter = FilterEngine::new(supervisor.system_link(), FilterPacing::from(&config.filter));
        let dispatcher = CampaignDispatcher::new(
            Arc::clone(&deps.contacts),
            Arc::clone(&deps.promos),
            contexts,
            CampaignPacing::from(&config.campaign),
            config.responder.campaign_fallback_prompt.clone(),
        );

        Self {
            supervisor,
            filter,
            dispatcher,
            contacts: deps.contacts,
            promos: deps.promos,
            completion: deps.completion,
            spintax: deps.spintax,
            observer: deps.observer,
            min_digits: config.filter.min_digits,
            tasks: TaskTracker::new(),
        }
    }

    /// Starts the shared system session.
    pub fn start(&self) {
        self.supervisor.start_system();
    }

    fn notify(&self, tenant: &TenantId, event: ObserverEvent) {
        self.observer.notify(&ObserverId::from(tenant), event);
    }

    fn tenant_link(&self, tenant: &TenantId) -> Result<Arc<dyn ConnectionLink>, WapulseError> {
        self.supervisor
            .tenant_link(tenant)
            .ok_or_else(|| WapulseError::SessionNotFound(tenant.to_string()))
    }

    pub fn system_state(&self) -> ConnectionState {
        self.supervisor.system_state()
    }

    /// `None` when the tenant has no registered session.
    pub fn session_state(&self, tenant: &TenantId) -> Option<ConnectionState> {
        self.supervisor.tenant(tenant).map(|handle| handle.state())
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Starts (or reuses) the tenant's session and registers default
    /// preferences for tenants seen for the first time.
    pub async fn start_session(&self, tenant: &TenantId) -> Result<(), WapulseError> {
        if self.contacts.get_tenant_preferences(tenant).await?.is_none() {
            self.contacts
                .set_tenant_preferences(tenant, TenantPreferences::default())
                .await?;
        }
        self.supervisor.start_session(tenant)?;
        Ok(())
    }

    /// Logs the tenant out and wipes its session, campaign mode and contacts.
    pub async fn stop_session(&self, tenant: &TenantId) -> Result<(), WapulseError> {
        self.filter.stop_filter(tenant);
        self.supervisor.stop_session(tenant).await
    }

    /// Starts a filter job over `raw` and streams its progress to the
    /// tenant's observer. Rejected while another job runs for the tenant.
    pub fn run_filter(&self, tenant: &TenantId, raw: &str) -> Result<(), WapulseError> {
        let job = self.filter.run_filter(tenant, raw)?;
        let observer = Arc::clone(&self.observer);
        self.tasks.spawn(forward_filter(job, observer));
        Ok(())
    }

    /// Cancels the tenant's filter job. Returns false if none was running.
    pub fn stop_filter(&self, tenant: &TenantId) -> bool {
        self.filter.stop_filter(tenant)
    }

    /// Switches the tenant's auto-replies to the promo-aware prompt.
    pub async fn enter_campaign_mode(
        &self,
        tenant: &TenantId,
        promo_id: PromoId,
    ) -> Result<CampaignContext, WapulseError> {
        let context = self.dispatcher.enter_campaign_mode(tenant, promo_id).await?;
        self.notify(tenant, ObserverEvent::log("Campaign mode enabled"));
        Ok(context)
    }

    /// Sends one promo and reports the result to the observer as well.
    ///
    /// A missing or disconnected session and an unknown promo are reported
    /// as a failed [`SendResult`], not as an error.
    pub async fn send_promo(
        &self,
        tenant: &TenantId,
        phone: &str,
        promo_id: PromoId,
        pool: ContactPool,
    ) -> Result<SendResult, WapulseError> {
        let sent = match self.tenant_link(tenant) {
            Ok(link) => {
                self.dispatcher
                    .send_one(tenant, link.as_ref(), phone, promo_id, pool)
                    .await
            }
            Err(e) => Err(e),
        };
        let result = match sent {
            Ok(result) => result,
            Err(
                e @ (WapulseError::SessionNotFound(_)
                | WapulseError::NotConnected { .. }
                | WapulseError::PromoNotFound { .. }),
            ) => SendResult::failed(phone, e),
            Err(e) => return Err(e),
        };
        self.notify(tenant, ObserverEvent::SendResult(result.clone()));
        Ok(result)
    }

    /// Starts a paced sequential send. Results stream to the observer.
    /// Returns the number of recipients.
    pub async fn send_sequential(
        &self,
        tenant: &TenantId,
        recipients: Recipients,
        promo_id: PromoId,
    ) -> Result<usize, WapulseError> {
        let (phones, pool) = match recipients {
            Recipients::Phones { phones, pool } => (phones, pool),
            Recipients::Pool(pool) => {
                let phones = self
                    .contacts
                    .list_contacts(tenant, pool)
                    .await?
                    .into_iter()
                    .map(|record| record.phone)
                    .collect();
                (phones, pool)
            }
        };
        let total = phones.len();
        let link = self.tenant_link(tenant)?;
        let mut run = self
            .dispatcher
            .send_sequential(tenant, link, phones, promo_id, pool)
            .await?;

        self.notify(
            tenant,
            ObserverEvent::log(format!("Sending promo to {total} contacts")),
        );
        let observer = Arc::clone(&self.observer);
        let id = ObserverId::from(tenant);
        let tenant = tenant.clone();
        self.tasks.spawn(async move {
            while let Some(result) = run.recv().await {
                observer.notify(&id, ObserverEvent::SendResult(result));
            }
            match run.summary().await {
                Ok(summary) => {
                    let mut message = format!(
                        "Campaign finished: {} sent, {} failed",
                        summary.sent, summary.failed
                    );
                    if summary.aborted {
                        message.push_str(", stopped because WhatsApp disconnected");
                    }
                    observer.notify(&id, ObserverEvent::log(message));
                }
                Err(e) => warn!(tenant = %tenant, error = %e, "campaign task failed"),
            }
        });
        Ok(total)
    }

    /// Imports filter results into the tenant's imported pool. Returns the
    /// number of contacts that were not already there.
    pub async fn save_valid_contacts(
        &self,
        tenant: &TenantId,
        numbers: &[String],
    ) -> Result<usize, WapulseError> {
        let phones = normalize_numbers(&numbers.join("\n"), self.min_digits);
        let added = self.contacts.import_contacts(tenant, &phones).await?;
        info!(tenant = %tenant, submitted = numbers.len(), added, "valid contacts saved");
        Ok(added)
    }

    /// Stored preferences, or the defaults for tenants never seen.
    pub async fn preferences(&self, tenant: &TenantId) -> Result<TenantPreferences, WapulseError> {
        Ok(self
            .contacts
            .get_tenant_preferences(tenant)
            .await?
            .unwrap_or_default())
    }

    pub async fn set_preferences(
        &self,
        tenant: &TenantId,
        preferences: TenantPreferences,
    ) -> Result<(), WapulseError> {
        self.contacts
            .set_tenant_preferences(tenant, preferences)
            .await
    }

    pub async fn list_promos(&self, tenant: &TenantId) -> Result<Vec<Promo>, WapulseError> {
        self.promos.list_promos(tenant).await
    }

    /// Rewrites plain promo text as spintax.
    pub async fn generate_spintax(&self, text: &str) -> Result<String, WapulseError> {
        self.spintax.complete(SPINTAX_PROMPT, text).await
    }

    /// Stops filter jobs, closes every session (without logging out) and
    /// shuts the completion adapters down.
    pub async fn shutdown(&self) {
        self.filter.stop_all();
        self.supervisor.shutdown().await;
        self.tasks.close();
        for adapter in [&self.completion, &self.spintax] {
            if let Err(e) = adapter.shutdown().await {
                warn!(adapter = adapter.name(), error = %e, "adapter shutdown failed");
            }
        }
        info!("runtime stopped");
    }
}

async fn forward_filter(mut job: FilterJob, observer: Arc<dyn Observer>) {
    let id = ObserverId::from(job.requester());
    while let Some(event) = job.recv().await {
        let notification = match event {
            FilterEvent::Started { total } => {
                ObserverEvent::log(format!("Checking {total} numbers"))
            }
            FilterEvent::Result { phone, validity } => ObserverEvent::PerNumberResult {
                phone,
                status: validity,
            },
            FilterEvent::Pausing {
                processed,
                duration,
                long: true,
            } => ObserverEvent::log(format!(
                "Checked {processed} numbers, pausing for {}s",
                duration.as_secs()
            )),
            FilterEvent::Pausing { .. } => continue,
            FilterEvent::Completed { valid, invalid } => {
                ObserverEvent::FilterSummary { valid, invalid }
            }
            FilterEvent::Stopped { valid, invalid } => {
                ObserverEvent::FilterStopped { valid, invalid }
            }
            FilterEvent::Errored { message } => ObserverEvent::FilterError { message },
        };
        observer.notify(&id, notification);
    }
}
