// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence layer for the Wapulse session service.
//!
//! Provides durable per-session credential blobs on disk, a SQLite contact
//! store (single writer via `tokio-rusqlite`, embedded migrations) and a
//! read-only JSON promo store.

pub mod contacts;
pub mod credentials;
pub mod database;
mod migrations;
pub mod promos;

pub use contacts::SqliteContactStore;
pub use credentials::FileSessionStore;
pub use database::Database;
pub use promos::JsonPromoStore;
