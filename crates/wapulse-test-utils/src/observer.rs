// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observer that records every notification for assertions.

use std::sync::{Arc, Mutex};

use wapulse_core::{Observer, ObserverEvent, ObserverId};

use crate::{lock, wait_until};

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(ObserverId, ObserverEvent)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every recorded notification, in delivery order.
    pub fn events(&self) -> Vec<(ObserverId, ObserverEvent)> {
        lock(&self.events).clone()
    }

    /// Notifications delivered to `observer`, in order.
    pub fn events_for(&self, observer: &str) -> Vec<ObserverEvent> {
        lock(&self.events)
            .iter()
            .filter(|(id, _)| id.0 == observer)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn count_for(&self, observer: &str, predicate: impl Fn(&ObserverEvent) -> bool) -> usize {
        self.events_for(observer).iter().filter(|e| predicate(e)).count()
    }

    /// Waits until `observer` has received an event matching `predicate`.
    pub async fn wait_for(
        &self,
        observer: &str,
        predicate: impl Fn(&ObserverEvent) -> bool,
    ) -> bool {
        wait_until(|| self.count_for(observer, &predicate) > 0).await
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl Observer for RecordingObserver {
    fn notify(&self, observer: &ObserverId, event: ObserverEvent) {
        lock(&self.events).push((observer.clone(), event));
    }
}
