// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session finite-state machine.
//!
//! [`transition`] is a pure function of (kind, state, event) that returns the
//! next state and the side effects the supervisor must carry out, in order.
//! The supervisor owns all I/O; nothing here touches a connection or a file.

use wapulse_core::{ConnectionState, InboundEnvelope, ProtocolEvent};

/// Whether a session belongs to a tenant or is the shared system session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Tenant,
    System,
}

/// A side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write the blob durably before handling the next event.
    PersistCredentials(Vec<u8>),
    DeleteCredentials,
    /// Forward the pairing challenge to the tenant's observer.
    PublishQr(String),
    /// Show the pairing challenge on the operator console.
    RenderConsoleQr(String),
    PublishStatus(ConnectionState),
    ResetBackoff,
    /// Hand the message to the session's inbound worker.
    Deliver(InboundEnvelope),
    /// Close this connection and open a new one for the same key.
    Reconnect,
    /// Drop the handle and cascade the local data wipe. The session ends.
    Terminate,
}

/// Computes the next state and effects for `event`.
///
/// `LoggedOut` is terminal: every event in that state is ignored.
pub fn transition(
    kind: SessionKind,
    state: ConnectionState,
    event: ProtocolEvent,
) -> (ConnectionState, Vec<Effect>) {
    use ConnectionState::*;

    if state == LoggedOut {
        return (LoggedOut, Vec::new());
    }

    match (kind, event) {
        (SessionKind::Tenant, ProtocolEvent::Qr(qr)) => (
            AwaitingScan,
            vec![Effect::PublishQr(qr), Effect::PublishStatus(AwaitingScan)],
        ),
        (SessionKind::System, ProtocolEvent::Qr(qr)) => {
            (AwaitingScan, vec![Effect::RenderConsoleQr(qr)])
        }

        (SessionKind::Tenant, ProtocolEvent::Connected) => (
            Connected,
            vec![Effect::ResetBackoff, Effect::PublishStatus(Connected)],
        ),
        (SessionKind::System, ProtocolEvent::Connected) => (Connected, vec![Effect::ResetBackoff]),

        (SessionKind::Tenant, ProtocolEvent::Disconnected { logged_out: false, .. }) => (
            Reconnecting,
            vec![Effect::PublishStatus(Reconnecting), Effect::Reconnect],
        ),
        (SessionKind::System, ProtocolEvent::Disconnected { logged_out: false, .. }) => {
            (Reconnecting, vec![Effect::Reconnect])
        }

        (SessionKind::Tenant, ProtocolEvent::Disconnected { logged_out: true, .. }) => (
            LoggedOut,
            vec![
                Effect::DeleteCredentials,
                Effect::PublishStatus(LoggedOut),
                Effect::Terminate,
            ],
        ),
        // The system session has no owner to redirect; it pairs again from scratch.
        (SessionKind::System, ProtocolEvent::Disconnected { logged_out: true, .. }) => (
            Reconnecting,
            vec![Effect::DeleteCredentials, Effect::Reconnect],
        ),

        (_, ProtocolEvent::CredentialsRotated(blob)) => {
            (state, vec![Effect::PersistCredentials(blob)])
        }

        (SessionKind::Tenant, ProtocolEvent::Message(envelope)) if state == Connected => {
            (state, vec![Effect::Deliver(envelope)])
        }
        (_, ProtocolEvent::Message(_)) => (state, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wapulse_core::{InboundContent, Jid};
    use ConnectionState::*;

    fn disconnected(logged_out: bool) -> ProtocolEvent {
        ProtocolEvent::Disconnected {
            reason: "test".into(),
            logged_out,
        }
    }

    fn message() -> ProtocolEvent {
        ProtocolEvent::Message(InboundEnvelope {
            sender: Jid::from_phone("15550001"),
            from_me: false,
            content: InboundContent::Text("hi".into()),
        })
    }

    #[test]
    fn tenant_qr_goes_to_observer() {
        let (state, effects) =
            transition(SessionKind::Tenant, Disconnected, ProtocolEvent::Qr("abc".into()));
        assert_eq!(state, AwaitingScan);
        assert_eq!(
            effects,
            vec![
                Effect::PublishQr("abc".into()),
                Effect::PublishStatus(AwaitingScan)
            ]
        );
    }

    #[test]
    fn system_qr_goes_to_console_only() {
        let (state, effects) =
            transition(SessionKind::System, Disconnected, ProtocolEvent::Qr("abc".into()));
        assert_eq!(state, AwaitingScan);
        assert_eq!(effects, vec![Effect::RenderConsoleQr("abc".into())]);
    }

    #[test]
    fn recoverable_disconnect_reconnects() {
        let (state, effects) = transition(SessionKind::Tenant, Connected, disconnected(false));
        assert_eq!(state, Reconnecting);
        assert!(effects.contains(&Effect::Reconnect));
        assert!(!effects.contains(&Effect::DeleteCredentials));
    }

    #[test]
    fn tenant_logout_wipes_and_terminates() {
        let (state, effects) = transition(SessionKind::Tenant, Connected, disconnected(true));
        assert_eq!(state, LoggedOut);
        assert_eq!(effects.first(), Some(&Effect::DeleteCredentials));
        assert_eq!(effects.last(), Some(&Effect::Terminate));
        assert!(!effects.contains(&Effect::Reconnect));
    }

    #[test]
    fn system_logout_pairs_again() {
        let (state, effects) = transition(SessionKind::System, Connected, disconnected(true));
        assert_eq!(state, Reconnecting);
        assert_eq!(effects, vec![Effect::DeleteCredentials, Effect::Reconnect]);
    }

    #[test]
    fn credentials_rotation_keeps_state() {
        for state in [AwaitingScan, Connected, Reconnecting] {
            let (next, effects) = transition(
                SessionKind::Tenant,
                state,
                ProtocolEvent::CredentialsRotated(vec![1, 2]),
            );
            assert_eq!(next, state);
            assert_eq!(effects, vec![Effect::PersistCredentials(vec![1, 2])]);
        }
    }

    #[test]
    fn messages_delivered_only_when_connected() {
        let (_, effects) = transition(SessionKind::Tenant, Connected, message());
        assert!(matches!(effects.as_slice(), [Effect::Deliver(_)]));
        let (_, effects) = transition(SessionKind::Tenant, AwaitingScan, message());
        assert!(effects.is_empty());
        let (_, effects) = transition(SessionKind::System, Connected, message());
        assert!(effects.is_empty());
    }

    #[test]
    fn logged_out_is_terminal() {
        for event in [ProtocolEvent::Connected, disconnected(false), message()] {
            let (state, effects) = transition(SessionKind::Tenant, LoggedOut, event);
            assert_eq!(state, LoggedOut);
            assert!(effects.is_empty());
        }
    }
}
