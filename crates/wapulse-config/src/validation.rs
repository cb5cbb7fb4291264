// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as ordered delay ranges, non-empty paths and bind addresses.

use crate::diagnostic::ConfigError;
use crate::model::WapulseConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &WapulseConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let mut range = |name: &str, min: u64, max: u64| {
        if min > max {
            errors.push(ConfigError::Validation {
                message: format!("{name}: minimum {min} is greater than maximum {max}"),
            });
        }
    };
    range(
        "sessions.reconnect_*_ms",
        config.sessions.reconnect_initial_ms,
        config.sessions.reconnect_max_ms,
    );
    range(
        "filter.jitter_*_ms",
        config.filter.jitter_min_ms,
        config.filter.jitter_max_ms,
    );
    range(
        "filter.pause_*_ms",
        config.filter.pause_min_ms,
        config.filter.pause_max_ms,
    );
    range(
        "filter.long_pause_*_ms",
        config.filter.long_pause_min_ms,
        config.filter.long_pause_max_ms,
    );
    range(
        "campaign.delay_*_ms",
        config.campaign.delay_min_ms,
        config.campaign.delay_max_ms,
    );

    if config.filter.min_digits == 0 {
        errors.push(ConfigError::Validation {
            message: "filter.min_digits must be at least 1".to_string(),
        });
    }

    if config.sessions.inbound_buffer == 0 {
        errors.push(ConfigError::Validation {
            message: "sessions.inbound_buffer must be at least 1".to_string(),
        });
    }

    for (name, value) in [
        ("service.data_dir", &config.service.data_dir),
        ("sessions.credentials_dir", &config.sessions.credentials_dir),
        ("campaign.promos_dir", &config.campaign.promos_dir),
        ("campaign.media_dir", &config.campaign.media_dir),
    ] {
        if value.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("{name} must not be empty"),
            });
        }
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("gateway.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if !(config.bridge.url.starts_with("ws://") || config.bridge.url.starts_with("wss://")) {
        errors.push(ConfigError::Validation {
            message: format!(
                "bridge.url `{}` must start with ws:// or wss://",
                config.bridge.url
            ),
        });
    }

    if config.bridge.request_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "bridge.request_timeout_secs must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
