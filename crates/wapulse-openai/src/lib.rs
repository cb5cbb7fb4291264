// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI completion adapter for Wapulse.
//!
//! Implements [`CompletionProvider`] over the chat-completions API. One
//! instance is bound to one model; the runtime holds one for auto-replies
//! and one for spintax generation.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use wapulse_config::model::OpenAiConfig;
use wapulse_core::{AdapterType, CompletionProvider, HealthStatus, PluginAdapter, WapulseError};

use crate::client::OpenAiClient;
use crate::types::{ChatMessage, ChatRequest};

/// Environment variable consulted when `openai.api_key` is unset.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// [`CompletionProvider`] backed by one OpenAI chat model.
pub struct OpenAiCompletion {
    client: OpenAiClient,
    model: String,
}

impl OpenAiCompletion {
    /// Creates a provider for `model` using the shared OpenAI settings.
    ///
    /// Fails with a configuration error when no API key is available.
    pub fn new(config: &OpenAiConfig, model: &str) -> Result<Self, WapulseError> {
        let api_key = resolve_api_key(config.api_key.as_deref())?;
        let client = OpenAiClient::new(
            &api_key,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        info!(model, "OpenAI completion provider initialized");
        Ok(Self {
            client,
            model: model.to_string(),
        })
    }

    /// Provider for auto-replies (`openai.model`).
    pub fn chat(config: &OpenAiConfig) -> Result<Self, WapulseError> {
        Self::new(config, &config.model)
    }

    /// Provider for spintax rewriting (`openai.spintax_model`).
    pub fn spintax(config: &OpenAiConfig) -> Result<Self, WapulseError> {
        Self::new(config, &config.spintax_model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Config value first, then the environment variable.
fn resolve_api_key(configured: Option<&str>) -> Result<String, WapulseError> {
    if let Some(key) = configured.filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| {
            WapulseError::Config(format!(
                "OpenAI API key not found: set openai.api_key in config or {API_KEY_ENV}"
            ))
        })
}

#[async_trait]
impl PluginAdapter for OpenAiCompletion {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Completion
    }

    async fn health_check(&self) -> Result<HealthStatus, WapulseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), WapulseError> {
        debug!(model = %self.model, "OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(
        &self,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, WapulseError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_text)],
        };
        let response = self.client.chat(&request).await?;
        response
            .first_text()
            .map(str::to_string)
            .ok_or_else(|| WapulseError::Completion {
                message: "completion response contained no text".into(),
                source: None,
            })
    }
}
