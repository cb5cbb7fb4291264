// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification sink for the party that owns a session.

use crate::types::{ObserverEvent, ObserverId};

/// Receives lifecycle and progress notifications.
///
/// Delivery is at-most-once and best-effort: implementations must not block
/// and may drop events when the observer is unreachable.
pub trait Observer: Send + Sync {
    fn notify(&self, observer: &ObserverId, event: ObserverEvent);
}
