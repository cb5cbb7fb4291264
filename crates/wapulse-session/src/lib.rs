// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol session supervision for the Wapulse service.
//!
//! One supervised session per tenant plus the shared system session used for
//! bulk existence checks. Each session is an explicit state machine
//! ([`fsm::transition`]) driven by protocol events; reconnects use a doubling
//! backoff and an explicit logout wipes the tenant's persisted credentials.

mod backoff;
pub mod fsm;
pub mod handle;
pub mod qr;
mod registry;
pub mod supervisor;

pub use fsm::{Effect, SessionKind, transition};
pub use handle::SessionHandle;
pub use supervisor::{SessionListener, Supervisor, SupervisorConfig};
