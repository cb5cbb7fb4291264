// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON frames exchanged with the protocol sidecar.
//!
//! Every frame is an object tagged by `type`. Requests that expect an answer
//! carry an `id`; the sidecar echoes it in a `response` frame.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use wapulse_core::{InboundContent, InboundEnvelope, Jid, OutboundPayload, ProtocolEvent};

/// Frames sent to the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// First frame on every socket. `credentials` is base64 or absent.
    Connect {
        session: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        credentials: Option<String>,
    },
    Exists {
        id: u64,
        jid: String,
    },
    Send {
        id: u64,
        to: String,
        #[serde(flatten)]
        content: SendContent,
    },
    Typing {
        id: u64,
        to: String,
    },
    Logout {
        id: u64,
    },
}

impl ClientFrame {
    pub fn connect(session: String, credentials: Option<&[u8]>) -> Self {
        Self::Connect {
            session,
            credentials: credentials.map(|bytes| STANDARD.encode(bytes)),
        }
    }
}

/// Message body of a `send` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SendContent {
    Text { text: String },
    Image { image: String, caption: String },
}

impl From<&OutboundPayload> for SendContent {
    fn from(payload: &OutboundPayload) -> Self {
        match payload {
            OutboundPayload::Text(text) => Self::Text { text: text.clone() },
            OutboundPayload::Image { path, caption } => Self::Image {
                image: path.display().to_string(),
                caption: caption.clone(),
            },
        }
    }
}

/// Frames received from the sidecar.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Qr {
        qr: String,
    },
    Connected,
    Disconnected {
        #[serde(default)]
        reason: String,
        #[serde(default)]
        logged_out: bool,
    },
    /// Rotated credentials, base64.
    Creds {
        data: String,
    },
    /// A raw inbound message object as emitted by the protocol library.
    Message {
        message: serde_json::Value,
    },
    Response {
        id: u64,
        #[serde(default)]
        ok: bool,
        #[serde(default)]
        exists: Option<bool>,
        #[serde(default)]
        error: Option<String>,
    },
}

/// Answer to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub ok: bool,
    pub exists: Option<bool>,
    pub error: Option<String>,
}

/// Decoded server frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Event(ProtocolEvent),
    Reply { id: u64, reply: Reply },
    /// Understood but carries nothing to act on.
    Ignored,
}

/// Decodes one text frame from the sidecar.
pub fn decode(text: &str) -> Result<Incoming, String> {
    let frame: ServerFrame =
        serde_json::from_str(text).map_err(|e| format!("malformed bridge frame: {e}"))?;
    let incoming = match frame {
        ServerFrame::Qr { qr } => Incoming::Event(ProtocolEvent::Qr(qr)),
        ServerFrame::Connected => Incoming::Event(ProtocolEvent::Connected),
        ServerFrame::Disconnected { reason, logged_out } => {
            Incoming::Event(ProtocolEvent::Disconnected { reason, logged_out })
        }
        ServerFrame::Creds { data } => {
            let bytes = STANDARD
                .decode(data.as_bytes())
                .map_err(|e| format!("credentials are not valid base64: {e}"))?;
            Incoming::Event(ProtocolEvent::CredentialsRotated(bytes))
        }
        ServerFrame::Message { message } => match normalize_message(&message) {
            Some(envelope) => Incoming::Event(ProtocolEvent::Message(envelope)),
            None => Incoming::Ignored,
        },
        ServerFrame::Response {
            id,
            ok,
            exists,
            error,
        } => Incoming::Reply {
            id,
            reply: Reply { ok, exists, error },
        },
    };
    Ok(incoming)
}

/// Turns a raw protocol message object into an envelope.
///
/// Plain `conversation` and `extendedTextMessage.text` become text, an image
/// caption becomes [`InboundContent::ImageWithCaption`] and anything else is
/// [`InboundContent::Other`]. Returns `None` when the sender is missing.
pub fn normalize_message(raw: &serde_json::Value) -> Option<InboundEnvelope> {
    let key = raw.get("key")?;
    let sender = key.get("remoteJid")?.as_str()?;
    let from_me = key
        .get("fromMe")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);

    let body = raw.get("message");
    let text_at = |pointer: &str| {
        body.and_then(|body| body.pointer(pointer))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    };
    let content = if let Some(text) = text_at("/conversation") {
        InboundContent::Text(text)
    } else if let Some(text) = text_at("/extendedTextMessage/text") {
        InboundContent::Text(text)
    } else if let Some(caption) = text_at("/imageMessage/caption") {
        InboundContent::ImageWithCaption { caption }
    } else {
        InboundContent::Other
    };

    Some(InboundEnvelope {
        sender: Jid::new(sender),
        from_me,
        content,
    })
}
