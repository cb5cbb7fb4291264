// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the session supervisor, the bulk engines and the
//! adapter traits.

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::WapulseError;

/// Identifier of a tenant: the owning key for every piece of per-tenant state.
///
/// Construction goes through [`TenantId::parse`], which rejects the values a
/// careless client sends when it has no user loaded (`""`, `"undefined"`,
/// `"null"`) and anything that could escape a per-tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, WapulseError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        let rejected = trimmed.is_empty()
            || trimmed == "undefined"
            || trimmed == "null"
            || trimmed.contains(['/', '\\'])
            || trimmed.contains("..")
            || trimmed.chars().any(char::is_control);
        if rejected {
            return Err(WapulseError::InvalidTenant(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = WapulseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}

/// Key of a protocol session: one per tenant plus the shared system session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// The shared session used only for bulk existence checks.
    System,
    Tenant(TenantId),
}

impl SessionKey {
    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        match self {
            Self::System => None,
            Self::Tenant(id) => Some(id),
        }
    }

    /// Directory name under which this session's credentials are stored.
    pub fn storage_name(&self) -> String {
        match self {
            Self::System => "system".to_string(),
            Self::Tenant(id) => format!("session_{id}"),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Tenant(id) => write!(f, "tenant:{id}"),
        }
    }
}

/// Lifecycle state of a protocol session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    AwaitingScan,
    Connected,
    Reconnecting,
    LoggedOut,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Short operator-facing description used in status notifications.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::AwaitingScan => "Waiting for QR scan",
            Self::Connected => "WhatsApp connected",
            Self::Reconnecting => "Connection lost, reconnecting",
            Self::LoggedOut => "Logged out",
        }
    }
}

/// Network-qualified protocol address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jid(String);

const USER_SUFFIX: &str = "@s.whatsapp.net";
const GROUP_SUFFIX: &str = "@g.us";

impl Jid {
    /// Builds the address for a phone number, keeping only its digits.
    pub fn from_phone(phone: &str) -> Self {
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        Self(format!("{digits}{USER_SUFFIX}"))
    }

    /// Wraps an address received from the protocol layer as-is.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_group(&self) -> bool {
        self.0.ends_with(GROUP_SUFFIX)
    }

    /// The user part of the address (the phone number for direct chats).
    pub fn user(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message content after normalization at the protocol boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    Text(String),
    ImageWithCaption { caption: String },
    Other,
}

impl InboundContent {
    /// Extractable text, if any. Blank text counts as none.
    pub fn text(&self) -> Option<&str> {
        let text = match self {
            Self::Text(text) => text,
            Self::ImageWithCaption { caption } => caption,
            Self::Other => return None,
        };
        let trimmed = text.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// An inbound message event delivered by a protocol connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub sender: Jid,
    pub from_me: bool,
    pub content: InboundContent,
}

/// Payload for an outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text(String),
    Image { path: PathBuf, caption: String },
}

/// Events surfaced by a live protocol connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// A pairing challenge to be scanned by the phone.
    Qr(String),
    Connected,
    Disconnected { reason: String, logged_out: bool },
    /// New credential material that must be persisted before continuing.
    CredentialsRotated(Vec<u8>),
    Message(InboundEnvelope),
}

/// Identifier of the party that receives notifications for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObserverId(pub String);

impl From<&TenantId> for ObserverId {
    fn from(value: &TenantId) -> Self {
        Self(value.as_str().to_string())
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single existence lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validity {
    Valid,
    Invalid,
}

/// Outcome of a single promo send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub phone: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendResult {
    pub fn ok(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(phone: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            phone: phone.into(),
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Notification pushed to a tenant's observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ObserverEvent {
    QrChallenge { qr: String },
    ConnectionStatus {
        state: ConnectionState,
        ready: bool,
        message: String,
    },
    PerNumberResult { phone: String, status: Validity },
    FilterSummary { valid: usize, invalid: usize },
    FilterStopped { valid: usize, invalid: usize },
    FilterError { message: String },
    SendResult(SendResult),
    LogLine { message: String },
    /// The tenant's session data is gone; always follows a `LoggedOut` status.
    DataWiped,
}

impl ObserverEvent {
    pub fn status(state: ConnectionState) -> Self {
        Self::ConnectionStatus {
            state,
            ready: state.is_connected(),
            message: state.describe().to_string(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        Self::LogLine {
            message: message.into(),
        }
    }
}

/// The two contact pools a tenant owns.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContactPool {
    /// Contacts the tenant added by hand.
    Saved,
    /// Contacts imported from files or filter results.
    Imported,
}

/// A stored contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub owner: TenantId,
    pub phone: String,
    pub name: Option<String>,
    pub pool: ContactPool,
    pub last_sent: Option<NaiveDate>,
}

/// Per-tenant auto-responder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPreferences {
    pub auto_responder_enabled: bool,
    pub default_prompt: Option<String>,
}

impl Default for TenantPreferences {
    fn default() -> Self {
        Self {
            auto_responder_enabled: true,
            default_prompt: None,
        }
    }
}

/// Identifier of a promo within a tenant's promo list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromoId(pub u64);

impl fmt::Display for PromoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A promotional message template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promo {
    pub id: PromoId,
    #[serde(default)]
    pub text: String,
    /// File name of an attached image, relative to the media directory.
    #[serde(default)]
    pub image: Option<String>,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Protocol,
    Completion,
    Storage,
}
