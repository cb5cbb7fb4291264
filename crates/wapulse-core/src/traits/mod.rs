// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Pluggable backends extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod completion;
pub mod observer;
pub mod protocol;
pub mod storage;

pub use adapter::PluginAdapter;
pub use completion::CompletionProvider;
pub use observer::Observer;
pub use protocol::{ConnectionLink, ProtocolConnection, ProtocolConnector, ProtocolSession};
pub use storage::{ContactStore, PromoStore, SessionStore};
