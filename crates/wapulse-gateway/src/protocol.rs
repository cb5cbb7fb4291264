// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client commands and their execution against the runtime.
//!
//! Client -> Server (JSON, tagged by `type`):
//! ```json
//! {"type": "init", "tenant": "42", "token": "secret"}
//! {"type": "check-numbers", "numbers": "2135550001\n2135550002"}
//! {"type": "send-promo", "phone": "2135550001", "promo_id": 1718000000000}
//! ```
//!
//! Every command is answered with a `reply` frame echoing its `type`.
//! Observer notifications are pushed as they happen, tagged by `event`.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use wapulse_agent::{Recipients, Runtime};
use wapulse_core::{ContactPool, PromoId, TenantId, TenantPreferences, WapulseError};

/// A command received on the client socket, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Binds the socket to a tenant. Must come first.
    Init {
        tenant: String,
        #[serde(default)]
        token: Option<String>,
    },
    StartSession,
    Logout,
    CheckNumbers {
        numbers: String,
    },
    StopFilter,
    StartCampaignMode {
        promo_id: PromoId,
    },
    SaveValidContacts {
        numbers: Vec<String>,
    },
    SendPromo {
        phone: String,
        promo_id: PromoId,
        #[serde(default = "default_pool")]
        pool: ContactPool,
    },
    /// Sends to `phones` when given, otherwise to every contact in `pool`.
    SendSequential {
        promo_id: PromoId,
        #[serde(default)]
        phones: Option<Vec<String>>,
        #[serde(default = "default_pool")]
        pool: ContactPool,
    },
    GetPreferences,
    SetPreferences {
        auto_responder_enabled: bool,
        #[serde(default)]
        default_prompt: Option<String>,
    },
    ListPromos,
    GenerateSpintax {
        text: String,
    },
}

fn default_pool() -> ContactPool {
    ContactPool::Saved
}

impl ClientCommand {
    /// The wire name of the command, echoed in its reply.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::StartSession => "start-session",
            Self::Logout => "logout",
            Self::CheckNumbers { .. } => "check-numbers",
            Self::StopFilter => "stop-filter",
            Self::StartCampaignMode { .. } => "start-campaign-mode",
            Self::SaveValidContacts { .. } => "save-valid-contacts",
            Self::SendPromo { .. } => "send-promo",
            Self::SendSequential { .. } => "send-sequential",
            Self::GetPreferences => "get-preferences",
            Self::SetPreferences { .. } => "set-preferences",
            Self::ListPromos => "list-promos",
            Self::GenerateSpintax { .. } => "generate-spintax",
        }
    }
}

/// Answer to one command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
    /// Always `"reply"`, so replies share the `event` tag with notifications.
    pub event: &'static str,
    pub command: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ok(command: &str, data: Value) -> Self {
        Self {
            event: "reply",
            command: command.to_string(),
            ok: true,
            data,
            error: None,
        }
    }

    pub fn error(command: &str, error: impl std::fmt::Display) -> Self {
        Self {
            event: "reply",
            command: command.to_string(),
            ok: false,
            data: Value::Null,
            error: Some(error.to_string()),
        }
    }

    /// Wraps the outcome of `execute` for `command`.
    pub fn from_result(command: &str, result: Result<Value, WapulseError>) -> Self {
        match result {
            Ok(data) => Self::ok(command, data),
            Err(e) => Self::error(command, e),
        }
    }
}

/// Runs a command for an initialized tenant. `Init` is handled by the socket.
pub async fn execute(
    runtime: &Runtime,
    tenant: &TenantId,
    command: ClientCommand,
) -> Result<Value, WapulseError> {
    match command {
        ClientCommand::Init { .. } => Err(WapulseError::Internal(
            "socket is already initialized".to_string(),
        )),
        ClientCommand::StartSession => {
            runtime.start_session(tenant).await?;
            Ok(Value::Null)
        }
        ClientCommand::Logout => {
            runtime.stop_session(tenant).await?;
            Ok(Value::Null)
        }
        ClientCommand::CheckNumbers { numbers } => {
            runtime.run_filter(tenant, &numbers)?;
            Ok(Value::Null)
        }
        ClientCommand::StopFilter => Ok(json!({ "stopped": runtime.stop_filter(tenant) })),
        ClientCommand::StartCampaignMode { promo_id } => {
            let context = runtime.enter_campaign_mode(tenant, promo_id).await?;
            Ok(json!({ "promo_id": context.promo_id }))
        }
        ClientCommand::SaveValidContacts { numbers } => {
            let added = runtime.save_valid_contacts(tenant, &numbers).await?;
            Ok(json!({ "added": added }))
        }
        ClientCommand::SendPromo {
            phone,
            promo_id,
            pool,
        } => {
            let result = runtime.send_promo(tenant, &phone, promo_id, pool).await?;
            Ok(to_value(&result)?)
        }
        ClientCommand::SendSequential {
            promo_id,
            phones,
            pool,
        } => {
            let recipients = match phones {
                Some(phones) => Recipients::Phones { phones, pool },
                None => Recipients::Pool(pool),
            };
            let total = runtime.send_sequential(tenant, recipients, promo_id).await?;
            Ok(json!({ "total": total }))
        }
        ClientCommand::GetPreferences => Ok(to_value(&runtime.preferences(tenant).await?)?),
        ClientCommand::SetPreferences {
            auto_responder_enabled,
            default_prompt,
        } => {
            runtime
                .set_preferences(
                    tenant,
                    TenantPreferences {
                        auto_responder_enabled,
                        default_prompt,
                    },
                )
                .await?;
            Ok(Value::Null)
        }
        ClientCommand::ListPromos => Ok(to_value(&runtime.list_promos(tenant).await?)?),
        ClientCommand::GenerateSpintax { text } => {
            let spintax = runtime.generate_spintax(&text).await?;
            Ok(json!({ "spintax": spintax }))
        }
    }
}

fn to_value(value: &impl Serialize) -> Result<Value, WapulseError> {
    serde_json::to_value(value)
        .map_err(|e| WapulseError::Internal(format!("failed to encode reply: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_deserialize_from_kebab_case() {
        let init: ClientCommand =
            serde_json::from_str(r#"{"type": "init", "tenant": "42"}"#).unwrap();
        assert_eq!(
            init,
            ClientCommand::Init {
                tenant: "42".into(),
                token: None
            }
        );

        let send: ClientCommand = serde_json::from_str(
            r#"{"type": "send-promo", "phone": "2135550001", "promo_id": 17, "pool": "imported"}"#,
        )
        .unwrap();
        assert_eq!(
            send,
            ClientCommand::SendPromo {
                phone: "2135550001".into(),
                promo_id: PromoId(17),
                pool: ContactPool::Imported
            }
        );
        assert_eq!(send.name(), "send-promo");

        let sequential: ClientCommand =
            serde_json::from_str(r#"{"type": "send-sequential", "promo_id": 17}"#).unwrap();
        assert_eq!(
            sequential,
            ClientCommand::SendSequential {
                promo_id: PromoId(17),
                phones: None,
                pool: ContactPool::Saved
            }
        );
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(serde_json::from_str::<ClientCommand>(r#"{"type": "reboot"}"#).is_err());
    }

    #[test]
    fn reply_shape() {
        let ok = serde_json::to_value(Reply::ok("stop-filter", json!({"stopped": true}))).unwrap();
        assert_eq!(
            ok,
            json!({"event": "reply", "command": "stop-filter", "ok": true, "data": {"stopped": true}})
        );
        let err = serde_json::to_value(Reply::error("logout", "no session")).unwrap();
        assert_eq!(
            err,
            json!({"event": "reply", "command": "logout", "ok": false, "error": "no session"})
        );
    }
}
