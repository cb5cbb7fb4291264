// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Wapulse session service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Top-level Wapulse configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WapulseConfig {
    /// Service identity and data locations.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Protocol session supervision.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Bulk number filter pacing.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Promo campaign pacing and file locations.
    #[serde(default)]
    pub campaign: CampaignConfig,

    /// Auto-responder prompts.
    #[serde(default)]
    pub responder: ResponderConfig,

    /// OpenAI chat-completions settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Protocol sidecar connection.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// WebSocket gateway.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Service identity and data locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Root directory for all persisted state.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_service_name() -> String {
    "wapulse".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("wapulse").display().to_string())
        .unwrap_or_else(|| "./data".to_string())
}

/// Protocol session supervision.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsConfig {
    /// Directory holding one credential blob per session.
    /// Relative paths resolve against `service.data_dir`.
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: String,

    /// Delay before the first reconnect attempt.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Ceiling for the doubling reconnect delay.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Capacity of each session's inbound message queue.
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            credentials_dir: default_credentials_dir(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

fn default_credentials_dir() -> String {
    "sessions".to_string()
}

fn default_reconnect_initial_ms() -> u64 {
    500
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_inbound_buffer() -> usize {
    64
}

/// Pacing of existence lookups against the system session.
///
/// Every lookup waits a jittered delay first. Every `pause_every` lookups a
/// longer pause is inserted, and every `long_pause_every` lookups a longer one
/// still. A zero `*_every` disables that pause.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Entries with fewer digits than this are discarded as garbage.
    #[serde(default = "default_min_digits")]
    pub min_digits: usize,

    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,

    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,

    #[serde(default = "default_pause_every")]
    pub pause_every: usize,

    #[serde(default = "default_pause_min_ms")]
    pub pause_min_ms: u64,

    #[serde(default = "default_pause_max_ms")]
    pub pause_max_ms: u64,

    #[serde(default = "default_long_pause_every")]
    pub long_pause_every: usize,

    #[serde(default = "default_long_pause_min_ms")]
    pub long_pause_min_ms: u64,

    #[serde(default = "default_long_pause_max_ms")]
    pub long_pause_max_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_digits: default_min_digits(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            pause_every: default_pause_every(),
            pause_min_ms: default_pause_min_ms(),
            pause_max_ms: default_pause_max_ms(),
            long_pause_every: default_long_pause_every(),
            long_pause_min_ms: default_long_pause_min_ms(),
            long_pause_max_ms: default_long_pause_max_ms(),
        }
    }
}

fn default_min_digits() -> usize {
    6
}

fn default_jitter_min_ms() -> u64 {
    300
}

fn default_jitter_max_ms() -> u64 {
    700
}

fn default_pause_every() -> usize {
    100
}

fn default_pause_min_ms() -> u64 {
    2_000
}

fn default_pause_max_ms() -> u64 {
    5_000
}

fn default_long_pause_every() -> usize {
    1_000
}

fn default_long_pause_min_ms() -> u64 {
    15_000
}

fn default_long_pause_max_ms() -> u64 {
    30_000
}

/// Promo campaign pacing and file locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    /// Lower bound of the delay between two sequential sends.
    #[serde(default = "default_delay_min_ms")]
    pub delay_min_ms: u64,

    /// Upper bound of the delay between two sequential sends.
    #[serde(default = "default_delay_max_ms")]
    pub delay_max_ms: u64,

    /// Enter campaign mode automatically when a sequential send starts.
    #[serde(default = "default_true")]
    pub auto_campaign_mode: bool,

    /// Directory holding `user_<tenant>/promos.json`.
    /// Relative paths resolve against `service.data_dir`.
    #[serde(default = "default_promos_dir")]
    pub promos_dir: String,

    /// Directory holding promo images.
    /// Relative paths resolve against `service.data_dir`.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            delay_min_ms: default_delay_min_ms(),
            delay_max_ms: default_delay_max_ms(),
            auto_campaign_mode: true,
            promos_dir: default_promos_dir(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_delay_min_ms() -> u64 {
    10_000
}

fn default_delay_max_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_promos_dir() -> String {
    "user_data".to_string()
}

fn default_media_dir() -> String {
    "promos".to_string()
}

/// Auto-responder prompts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    /// System prompt used when the tenant has no default prompt.
    #[serde(default = "default_fallback_prompt")]
    pub fallback_prompt: String,

    /// Business description used for campaign mode when the tenant has no default prompt.
    #[serde(default = "default_campaign_fallback_prompt")]
    pub campaign_fallback_prompt: String,

    /// Show a "composing" presence before replying.
    #[serde(default = "default_true")]
    pub typing_indicator: bool,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            fallback_prompt: default_fallback_prompt(),
            campaign_fallback_prompt: default_campaign_fallback_prompt(),
            typing_indicator: true,
        }
    }
}

fn default_fallback_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_campaign_fallback_prompt() -> String {
    "General store".to_string()
}

/// OpenAI chat-completions configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. `None` falls back to the `OPENAI_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model used by the auto-responder.
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Model used to rewrite promo text into spintax.
    #[serde(default = "default_spintax_model")]
    pub spintax_model: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_openai_timeout_secs")]
    pub timeout_secs: u64,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("spintax_model", &self.spintax_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            spintax_model: default_spintax_model(),
            timeout_secs: default_openai_timeout_secs(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_spintax_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_openai_timeout_secs() -> u64 {
    60
}

/// Connection to the protocol sidecar.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// WebSocket URL of the sidecar (`ws://` or `wss://`).
    #[serde(default = "default_bridge_url")]
    pub url: String,

    /// How long to wait for the sidecar to answer a request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: default_bridge_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bridge_url() -> String {
    "ws://127.0.0.1:8787/session".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// WebSocket gateway configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind to.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Token clients must present in their `init` message. `None` disables the check.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    3001
}

impl WapulseConfig {
    /// Resolves a possibly relative directory against `service.data_dir`.
    pub fn resolve_dir(&self, dir: &str) -> std::path::PathBuf {
        let path = std::path::Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::path::Path::new(&self.service.data_dir).join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted_in_debug() {
        let mut config = WapulseConfig::default();
        config.openai.api_key = Some("sk-live-123".into());
        config.gateway.bearer_token = Some("hunter2".into());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-live-123"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn relative_dirs_resolve_under_data_dir() {
        let mut config = WapulseConfig::default();
        config.service.data_dir = "/var/lib/wapulse".into();
        assert_eq!(
            config.resolve_dir("sessions"),
            std::path::PathBuf::from("/var/lib/wapulse/sessions")
        );
        assert_eq!(
            config.resolve_dir("/srv/promos"),
            std::path::PathBuf::from("/srv/promos")
        );
    }
}
