// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A stand-alone [`ConnectionLink`] for testing the engines that consume one.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wapulse_core::{ConnectionLink, ConnectionState, Jid, OutboundPayload, WapulseError};

use crate::lock;

#[derive(Default)]
struct State {
    connected: bool,
    registered: HashSet<String>,
    failing_lookups: HashSet<String>,
    failing_sends: HashSet<String>,
    dropped_sends: HashSet<String>,
    disconnect_after_sends: Option<usize>,
    sent: Vec<(Jid, OutboundPayload)>,
    lookups: Vec<Jid>,
    typing: Vec<Jid>,
}

/// Link whose state and answers are set by the test.
pub struct MockLink {
    state: Mutex<State>,
}

impl MockLink {
    pub fn connected() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                connected: true,
                ..State::default()
            }),
        })
    }

    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        lock(&self.state).connected = connected;
    }

    pub fn register_numbers<'a>(&self, phones: impl IntoIterator<Item = &'a str>) {
        lock(&self.state)
            .registered
            .extend(phones.into_iter().map(str::to_string));
    }

    pub fn fail_lookups_for<'a>(&self, phones: impl IntoIterator<Item = &'a str>) {
        lock(&self.state)
            .failing_lookups
            .extend(phones.into_iter().map(str::to_string));
    }

    pub fn fail_sends_to<'a>(&self, phones: impl IntoIterator<Item = &'a str>) {
        lock(&self.state)
            .failing_sends
            .extend(phones.into_iter().map(str::to_string));
    }

    /// Sends to these numbers fail with `NotConnected` while the link keeps
    /// reporting itself connected, as when the session drops mid-send and
    /// reconnects before the next check.
    pub fn drop_sends_to<'a>(&self, phones: impl IntoIterator<Item = &'a str>) {
        lock(&self.state)
            .dropped_sends
            .extend(phones.into_iter().map(str::to_string));
    }

    /// Flips the link to disconnected once `count` sends have succeeded.
    pub fn disconnect_after_sends(&self, count: usize) {
        lock(&self.state).disconnect_after_sends = Some(count);
    }

    pub fn sent(&self) -> Vec<(Jid, OutboundPayload)> {
        lock(&self.state).sent.clone()
    }

    pub fn lookups(&self) -> Vec<Jid> {
        lock(&self.state).lookups.clone()
    }

    pub fn typing(&self) -> Vec<Jid> {
        lock(&self.state).typing.clone()
    }
}

fn not_connected() -> WapulseError {
    WapulseError::NotConnected {
        session: "mock".into(),
    }
}

#[async_trait]
impl ConnectionLink for MockLink {
    fn state(&self) -> ConnectionState {
        if lock(&self.state).connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn exists(&self, jid: &Jid) -> Result<bool, WapulseError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(not_connected());
        }
        state.lookups.push(jid.clone());
        if state.failing_lookups.contains(jid.user()) {
            return Err(WapulseError::protocol("mock lookup failed"));
        }
        Ok(state.registered.contains(jid.user()))
    }

    async fn send(&self, to: &Jid, payload: &OutboundPayload) -> Result<(), WapulseError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(not_connected());
        }
        if state.dropped_sends.contains(to.user()) {
            return Err(not_connected());
        }
        if state.failing_sends.contains(to.user()) {
            return Err(WapulseError::protocol("mock send failed"));
        }
        state.sent.push((to.clone(), payload.clone()));
        if state
            .disconnect_after_sends
            .is_some_and(|limit| state.sent.len() >= limit)
        {
            state.connected = false;
        }
        Ok(())
    }

    async fn send_typing(&self, to: &Jid) -> Result<(), WapulseError> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(not_connected());
        }
        state.typing.push(to.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn io_follows_connection_state() {
        let link = MockLink::disconnected();
        let to = Jid::from_phone("1");
        assert!(link.send(&to, &OutboundPayload::Text("x".into())).await.is_err());

        link.set_connected(true);
        assert!(link.state().is_connected());
        link.send(&to, &OutboundPayload::Text("x".into())).await.unwrap();
        assert_eq!(link.sent().len(), 1);
    }
}
