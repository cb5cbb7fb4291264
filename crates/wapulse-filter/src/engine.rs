// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The filter engine and its per-requester jobs.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wapulse_config::model::FilterConfig;
use wapulse_core::{ConnectionLink, Jid, TenantId, Validity, WapulseError};

use crate::normalize::normalize_numbers;

/// Pacing and input rules for filter jobs.
#[derive(Debug, Clone)]
pub struct FilterPacing {
    pub min_digits: usize,
    pub jitter: RangeInclusive<Duration>,
    /// Pause before every `pause_every`-th item. Zero disables it.
    pub pause_every: usize,
    pub pause: RangeInclusive<Duration>,
    /// Longer pause before every `long_pause_every`-th item. Zero disables it.
    pub long_pause_every: usize,
    pub long_pause: RangeInclusive<Duration>,
}

fn ms_range(min: u64, max: u64) -> RangeInclusive<Duration> {
    Duration::from_millis(min)..=Duration::from_millis(max.max(min))
}

impl From<&FilterConfig> for FilterPacing {
    fn from(config: &FilterConfig) -> Self {
        Self {
            min_digits: config.min_digits,
            jitter: ms_range(config.jitter_min_ms, config.jitter_max_ms),
            pause_every: config.pause_every,
            pause: ms_range(config.pause_min_ms, config.pause_max_ms),
            long_pause_every: config.long_pause_every,
            long_pause: ms_range(config.long_pause_min_ms, config.long_pause_max_ms),
        }
    }
}

impl FilterPacing {
    /// The pause to take before item `index`, if any. The long pause wins
    /// when both thresholds coincide.
    fn pause_before(&self, index: usize) -> Option<(RangeInclusive<Duration>, bool)> {
        if index == 0 {
            return None;
        }
        if self.long_pause_every > 0 && index % self.long_pause_every == 0 {
            return Some((self.long_pause.clone(), true));
        }
        if self.pause_every > 0 && index % self.pause_every == 0 {
            return Some((self.pause.clone(), false));
        }
        None
    }
}

fn random_in(range: &RangeInclusive<Duration>) -> Duration {
    let (lo, hi) = (range.start().as_millis() as u64, range.end().as_millis() as u64);
    if lo >= hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

/// Progress of one filter job, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    Started { total: usize },
    Result { phone: String, validity: Validity },
    Pausing {
        processed: usize,
        duration: Duration,
        long: bool,
    },
    Completed { valid: usize, invalid: usize },
    Stopped { valid: usize, invalid: usize },
    Errored { message: String },
}

/// Terminal state of a filter job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    Completed { valid: usize, invalid: usize },
    Stopped { valid: usize, invalid: usize },
    Errored(String),
}

impl FilterOutcome {
    fn event(&self) -> FilterEvent {
        match self {
            Self::Completed { valid, invalid } => FilterEvent::Completed {
                valid: *valid,
                invalid: *invalid,
            },
            Self::Stopped { valid, invalid } => FilterEvent::Stopped {
                valid: *valid,
                invalid: *invalid,
            },
            Self::Errored(message) => FilterEvent::Errored {
                message: message.clone(),
            },
        }
    }
}

/// A running filter job.
///
/// Events arrive in order and end with exactly one terminal event
/// (`Completed`, `Stopped` or `Errored`). Dropping the job does not stop it;
/// call [`FilterJob::cancel`] or [`FilterEngine::stop_filter`].
pub struct FilterJob {
    requester: TenantId,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<FilterEvent>,
    task: JoinHandle<FilterOutcome>,
}

impl FilterJob {
    pub fn requester(&self) -> &TenantId {
        &self.requester
    }

    /// Next progress event, or `None` once the terminal event has been read.
    pub async fn recv(&mut self) -> Option<FilterEvent> {
        self.events.recv().await
    }

    /// Requests a stop. Takes effect at the next item boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the job to finish, discarding unread events.
    pub async fn outcome(self) -> FilterOutcome {
        drop(self.events);
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => FilterOutcome::Errored(format!("filter task failed: {e}")),
        }
    }
}

struct ActiveJob {
    id: u64,
    cancel: CancellationToken,
}

/// Runs filter jobs against the shared system session.
pub struct FilterEngine {
    link: Arc<dyn ConnectionLink>,
    pacing: FilterPacing,
    active: Arc<DashMap<TenantId, ActiveJob>>,
    next_id: AtomicU64,
    /// Serializes lookups across every requester's job.
    lookups: Arc<tokio::sync::Mutex<()>>,
}

impl FilterEngine {
    pub fn new(link: Arc<dyn ConnectionLink>, pacing: FilterPacing) -> Self {
        Self {
            link,
            pacing,
            active: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
            lookups: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Normalizes `raw` and starts checking it for `requester`.
    ///
    /// At most one job runs per requester; a second request while one is
    /// active is rejected with [`WapulseError::FilterAlreadyRunning`].
    pub fn run_filter(&self, requester: &TenantId, raw: &str) -> Result<FilterJob, WapulseError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        match self.active.entry(requester.clone()) {
            Entry::Occupied(_) => {
                return Err(WapulseError::FilterAlreadyRunning(requester.to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(ActiveJob {
                    id,
                    cancel: cancel.clone(),
                });
            }
        }

        let numbers = normalize_numbers(raw, self.pacing.min_digits);
        let (tx, events) = mpsc::unbounded_channel();
        let run = JobRun {
            requester: requester.clone(),
            id,
            numbers,
            link: Arc::clone(&self.link),
            pacing: self.pacing.clone(),
            cancel: cancel.clone(),
            events: tx,
            active: Arc::clone(&self.active),
            lookups: Arc::clone(&self.lookups),
        };
        let task = tokio::spawn(run.execute());

        Ok(FilterJob {
            requester: requester.clone(),
            cancel,
            events,
            task,
        })
    }

    /// Cancels the requester's running job. Returns false if none is running.
    pub fn stop_filter(&self, requester: &TenantId) -> bool {
        match self.active.get(requester) {
            Some(job) => {
                info!(requester = %requester, "filter stop requested");
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, requester: &TenantId) -> bool {
        self.active.contains_key(requester)
    }

    /// Cancels every running job.
    pub fn stop_all(&self) {
        for job in self.active.iter() {
            job.cancel.cancel();
        }
    }
}

struct JobRun {
    requester: TenantId,
    id: u64,
    numbers: Vec<String>,
    link: Arc<dyn ConnectionLink>,
    pacing: FilterPacing,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<FilterEvent>,
    active: Arc<DashMap<TenantId, ActiveJob>>,
    lookups: Arc<tokio::sync::Mutex<()>>,
}

impl JobRun {
    fn emit(&self, event: FilterEvent) {
        // A dropped receiver only means nobody is watching.
        let _ = self.events.send(event);
    }

    /// Sleeps for `duration` unless cancelled first. Returns false on cancel.
    async fn pace(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn execute(self) -> FilterOutcome {
        let outcome = self.check_all().await;
        let id = self.id;
        self.active
            .remove_if(&self.requester, |_, job| job.id == id);
        match &outcome {
            FilterOutcome::Completed { valid, invalid } => {
                info!(requester = %self.requester, valid, invalid, "filter completed");
            }
            FilterOutcome::Stopped { valid, invalid } => {
                info!(requester = %self.requester, valid, invalid, "filter stopped");
            }
            FilterOutcome::Errored(message) => {
                warn!(requester = %self.requester, error = %message, "filter failed");
            }
        }
        self.emit(outcome.event());
        outcome
    }

    async fn check_all(&self) -> FilterOutcome {
        if !self.link.state().is_connected() {
            return FilterOutcome::Errored("system session is not connected".into());
        }

        let total = self.numbers.len();
        info!(requester = %self.requester, total, "filter started");
        self.emit(FilterEvent::Started { total });

        let (mut valid, mut invalid) = (0, 0);
        let stopped = |valid, invalid| FilterOutcome::Stopped { valid, invalid };

        for (index, phone) in self.numbers.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return stopped(valid, invalid);
            }

            if let Some((range, long)) = self.pacing.pause_before(index) {
                let duration = random_in(&range);
                debug!(requester = %self.requester, processed = index, ?duration, long, "pausing");
                self.emit(FilterEvent::Pausing {
                    processed: index,
                    duration,
                    long,
                });
                if !self.pace(duration).await {
                    return stopped(valid, invalid);
                }
            }

            if !self.pace(random_in(&self.pacing.jitter)).await {
                return stopped(valid, invalid);
            }

            let validity = {
                let _serial = self.lookups.lock().await;
                match self.link.exists(&Jid::from_phone(phone)).await {
                    Ok(true) => Validity::Valid,
                    Ok(false) => Validity::Invalid,
                    Err(e) => {
                        debug!(requester = %self.requester, phone = %phone, error = %e, "lookup failed, counting as invalid");
                        Validity::Invalid
                    }
                }
            };
            match validity {
                Validity::Valid => valid += 1,
                Validity::Invalid => invalid += 1,
            }
            debug!(requester = %self.requester, phone = %phone, ?validity, "number checked");
            self.emit(FilterEvent::Result {
                phone: phone.clone(),
                validity,
            });
        }

        FilterOutcome::Completed { valid, invalid }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wapulse_test_utils::MockLink;

    fn pacing() -> FilterPacing {
        FilterPacing {
            min_digits: 6,
            jitter: ms_range(300, 700),
            pause_every: 0,
            pause: ms_range(2000, 5000),
            long_pause_every: 0,
            long_pause: ms_range(15000, 30000),
        }
    }

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    async fn drain(job: &mut FilterJob) -> Vec<FilterEvent> {
        let mut events = Vec::new();
        while let Some(event) = job.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_result_per_number_then_summary() {
        let link = MockLink::connected();
        link.register_numbers(["12125550000", "999999"]);
        let engine = FilterEngine::new(link.clone(), pacing());

        let mut job = engine
            .run_filter(&tenant("1"), "12345\n+1 (212) 555-0000\nab\n999999\n4444444")
            .unwrap();
        let events = drain(&mut job).await;

        assert_eq!(events[0], FilterEvent::Started { total: 3 });
        let results: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                FilterEvent::Result { phone, validity } => Some((phone.as_str(), *validity)),
                _ => None,
            })
            .collect();
        assert_eq!(
            results,
            vec![
                ("12125550000", Validity::Valid),
                ("999999", Validity::Valid),
                ("4444444", Validity::Invalid),
            ]
        );
        assert_eq!(
            events.last(),
            Some(&FilterEvent::Completed { valid: 2, invalid: 1 })
        );
        assert_eq!(job.outcome().await, FilterOutcome::Completed { valid: 2, invalid: 1 });
        assert!(!engine.is_running(&tenant("1")));
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_errors_count_as_invalid() {
        let link = MockLink::connected();
        link.register_numbers(["111111"]);
        link.fail_lookups_for(["111111"]);
        let engine = FilterEngine::new(link, pacing());

        let job = engine.run_filter(&tenant("1"), "111111").unwrap();
        assert_eq!(job.outcome().await, FilterOutcome::Completed { valid: 0, invalid: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_system_session_fails_fast() {
        let link = MockLink::disconnected();
        let engine = FilterEngine::new(link.clone(), pacing());

        let mut job = engine.run_filter(&tenant("1"), "111111\n222222").unwrap();
        let events = drain(&mut job).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FilterEvent::Errored { .. }));
        assert!(link.lookups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_before_next_item() {
        let link = MockLink::connected();
        let engine = FilterEngine::new(link.clone(), pacing());
        let raw = (0..10).map(|i| format!("55500{i:02}")).collect::<Vec<_>>().join("\n");

        let mut job = engine.run_filter(&tenant("1"), &raw).unwrap();
        let mut results = 0;
        while let Some(event) = job.recv().await {
            if matches!(event, FilterEvent::Result { .. }) {
                results += 1;
                if results == 3 {
                    assert!(engine.stop_filter(&tenant("1")));
                }
            }
            if let FilterEvent::Stopped { valid, invalid } = event {
                assert_eq!(valid + invalid, results);
                break;
            }
            assert!(!matches!(event, FilterEvent::Completed { .. }));
        }

        assert_eq!(results, 3);
        assert_eq!(link.lookups().len(), 3);
        assert_eq!(job.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn second_job_for_same_requester_is_rejected() {
        let link = MockLink::connected();
        let engine = FilterEngine::new(link, pacing());

        let job = engine.run_filter(&tenant("1"), "111111\n222222").unwrap();
        assert!(matches!(
            engine.run_filter(&tenant("1"), "333333"),
            Err(WapulseError::FilterAlreadyRunning(_))
        ));
        // Other requesters are independent.
        let other = engine.run_filter(&tenant("2"), "333333").unwrap();

        job.outcome().await;
        other.outcome().await;
        assert!(engine.run_filter(&tenant("1"), "444444").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_pauses_are_reported() {
        let link = MockLink::connected();
        let engine = FilterEngine::new(
            link,
            FilterPacing {
                pause_every: 2,
                long_pause_every: 4,
                ..pacing()
            },
        );
        let raw = (0..5).map(|i| format!("77700{i:02}")).collect::<Vec<_>>().join("\n");

        let mut job = engine.run_filter(&tenant("1"), &raw).unwrap();
        let pauses: Vec<_> = drain(&mut job)
            .await
            .into_iter()
            .filter_map(|e| match e {
                FilterEvent::Pausing {
                    processed,
                    duration,
                    long,
                } => Some((processed, long, duration)),
                _ => None,
            })
            .collect();

        assert_eq!(pauses.len(), 2);
        assert_eq!((pauses[0].0, pauses[0].1), (2, false));
        assert_eq!((pauses[1].0, pauses[1].1), (4, true));
        assert!(pauses[1].2 >= Duration::from_millis(15000));
    }

    #[test]
    fn stop_without_job_reports_false() {
        let engine = FilterEngine::new(MockLink::connected(), pacing());
        assert!(!engine.stop_filter(&tenant("1")));
    }
}
