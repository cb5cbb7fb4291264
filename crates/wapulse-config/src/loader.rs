// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./wapulse.toml` > `~/.config/wapulse/wapulse.toml` > `/etc/wapulse/wapulse.toml`
//! with environment variable overrides via `WAPULSE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::WapulseConfig;

/// Top-level sections, used to map `WAPULSE_<SECTION>_<KEY>` onto `<section>.<key>`.
const SECTIONS: &[&str] = &[
    "service",
    "sessions",
    "filter",
    "campaign",
    "responder",
    "openai",
    "bridge",
    "gateway",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/wapulse/wapulse.toml` (system-wide)
/// 3. `~/.config/wapulse/wapulse.toml` (user XDG config)
/// 4. `./wapulse.toml` (local directory)
/// 5. `WAPULSE_*` environment variables
pub fn load_config() -> Result<WapulseConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<WapulseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WapulseConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<WapulseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(WapulseConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(WapulseConfig::default()))
        .merge(Toml::file("/etc/wapulse/wapulse.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("wapulse/wapulse.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("wapulse.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `WAPULSE_OPENAI_API_KEY` must map to `openai.api_key`, not
/// `openai.api.key`.
fn env_provider() -> Env {
    Env::prefixed("WAPULSE_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|field| format!("{section}.{field}"))
        })
        .unwrap_or_else(|| key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_first_underscore_after_section() {
        assert_eq!(map_env_key("openai_api_key"), "openai.api_key");
        assert_eq!(map_env_key("sessions_reconnect_max_ms"), "sessions.reconnect_max_ms");
        assert_eq!(map_env_key("service_log_level"), "service.log_level");
        assert_eq!(map_env_key("filter_long_pause_every"), "filter.long_pause_every");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }
}
