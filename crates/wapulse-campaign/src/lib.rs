// SPDX-FileCopyrightText: 2026 Wapulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Promo campaigns: spintax expansion, per-tenant campaign mode and
//! sequential, paced dispatch over a tenant's own session.

pub mod context;
pub mod dispatcher;
pub mod spintax;

pub use context::{CampaignContext, CampaignContexts};
pub use dispatcher::{CampaignDispatcher, CampaignPacing, CampaignRun, CampaignSummary};
