// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket gateway for Wapulse dashboard clients.
//!
//! A thin surface: client commands map one-to-one onto [`wapulse_agent::Runtime`]
//! operations and the tenant's observer notifications are pushed back on the
//! same socket.

pub mod protocol;
pub mod server;
pub mod ws;

pub use protocol::{ClientCommand, Reply};
pub use server::{GatewayState, router, serve, serve_on};
