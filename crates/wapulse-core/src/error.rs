// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Wapulse session service.

use thiserror::Error;

use crate::types::PromoId;

/// The primary error type used across all Wapulse adapter traits and core operations.
#[derive(Debug, Error)]
pub enum WapulseError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (credential files, contact store, promo files).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Protocol connection errors (connect failure, send failure, lookup failure).
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Text-completion provider errors (API failure, empty response).
    #[error("completion error: {message}")]
    Completion {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The session's connection is not in the Connected state.
    #[error("session {session} is not connected")]
    NotConnected { session: String },

    /// No live session exists for the tenant.
    #[error("no session for tenant {0}")]
    SessionNotFound(String),

    /// The tenant identifier is empty or otherwise unusable.
    #[error("invalid tenant id: {0:?}")]
    InvalidTenant(String),

    /// The requested promo does not exist for the tenant.
    #[error("promo {promo_id} not found for tenant {tenant}")]
    PromoNotFound { tenant: String, promo_id: PromoId },

    /// A filter job is already running for this requester.
    #[error("a filter job is already running for {0}")]
    FilterAlreadyRunning(String),

    /// A sequential campaign is already running for this tenant.
    #[error("a campaign is already running for {0}")]
    CampaignAlreadyRunning(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WapulseError {
    /// Shorthand for a protocol error without an underlying source.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps any storage-layer error.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }
}
