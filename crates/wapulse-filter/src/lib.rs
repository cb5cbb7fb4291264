// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Numbers filter: checks which phone numbers are registered accounts.
//!
//! Lookups for every requester go through the one shared system session,
//! strictly one at a time, with jittered pacing and periodic longer pauses.

pub mod engine;
pub mod normalize;

pub use engine::{FilterEngine, FilterEvent, FilterJob, FilterOutcome, FilterPacing};
pub use normalize::normalize_numbers;
