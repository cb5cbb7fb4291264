// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Wapulse session service.
//!
//! This crate provides the trait definitions, error type and domain types
//! shared across the workspace. The protocol connector, the completion
//! provider and the persistence backends all implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::WapulseError;
pub use types::{
    AdapterType, ConnectionState, ContactPool, ContactRecord, HealthStatus, InboundContent,
    InboundEnvelope, Jid, ObserverEvent, ObserverId, OutboundPayload, Promo, PromoId,
    ProtocolEvent, SendResult, SessionKey, TenantId, TenantPreferences, Validity,
};

pub use traits::{
    CompletionProvider, ConnectionLink, ContactStore, Observer, PluginAdapter, PromoStore,
    ProtocolConnection, ProtocolConnector, ProtocolSession, SessionStore,
};
