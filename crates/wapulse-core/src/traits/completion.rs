// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External text-completion capability.

use async_trait::async_trait;

use crate::error::WapulseError;
use crate::traits::adapter::PluginAdapter;

/// Produces a reply for a (system prompt, user text) pair.
#[async_trait]
pub trait CompletionProvider: PluginAdapter {
    async fn complete(&self, system_prompt: &str, user_text: &str)
    -> Result<String, WapulseError>;
}
