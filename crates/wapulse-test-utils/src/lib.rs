// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Wapulse integration tests.
//!
//! Provides mock adapters for fast, deterministic tests without a protocol
//! sidecar or a completion API.
//!
//! # Components
//!
//! - [`MockProtocol`] - Scriptable protocol connector with event injection and captured sends
//! - [`MockLink`] - Stand-alone [`ConnectionLink`](wapulse_core::ConnectionLink) with settable state
//! - [`RecordingObserver`] - Observer that records every notification
//! - [`MockCompletion`] - Completion provider with queued replies

pub mod mock_completion;
pub mod mock_link;
pub mod mock_protocol;
pub mod observer;

pub use mock_completion::MockCompletion;
pub use mock_link::MockLink;
pub use mock_protocol::{MockProtocol, SentMessage};
pub use observer::RecordingObserver;

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long the `wait_for*` helpers poll before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Polls `condition` until it holds or [`WAIT_TIMEOUT`] elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
