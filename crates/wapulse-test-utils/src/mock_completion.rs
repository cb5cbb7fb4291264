// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock completion provider for deterministic testing.
//!
//! Replies are taken from a queue; once it is empty every call returns the
//! default reply. Every (system prompt, user text) pair is captured.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wapulse_core::{AdapterType, CompletionProvider, HealthStatus, PluginAdapter, WapulseError};

use crate::lock;

pub struct MockCompletion {
    queued: Mutex<VecDeque<Result<String, String>>>,
    default_reply: Result<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockCompletion {
    /// Always answers `reply` unless something else is queued.
    pub fn replying(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            queued: Mutex::new(VecDeque::new()),
            default_reply: Ok(reply.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Always fails unless something else is queued.
    pub fn failing(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            queued: Mutex::new(VecDeque::new()),
            default_reply: Err(message.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.queued).push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        lock(&self.queued).push_back(Err(message.into()));
    }

    /// Captured (system prompt, user text) pairs.
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PluginAdapter for MockCompletion {
    fn name(&self) -> &str {
        "mock-completion"
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
        Ok(())
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    async fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String, WapulseError> {
        lock(&self.calls).push((system_prompt.to_string(), user_text.to_string()));
        let next = lock(&self.queued)
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone());
        next.map_err(|message| WapulseError::Completion {
            message,
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_answers_come_before_the_default() {
        let mock = MockCompletion::replying("default");
        mock.push_error("rate limited");
        mock.push_reply("queued");

        assert!(mock.complete("s", "1").await.is_err());
        assert_eq!(mock.complete("s", "2").await.unwrap(), "queued");
        assert_eq!(mock.complete("s", "3").await.unwrap(), "default");
        assert_eq!(mock.calls().len(), 3);
    }
}
