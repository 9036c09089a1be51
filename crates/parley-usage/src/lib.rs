// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token usage accounting.
//!
//! Prices come from per-1K rates in the model catalog. Records flow
//! through the [`UsageSink`] seam into storage; recording is always
//! best-effort so accounting can never break a running game.

pub mod context;
pub mod pricing;
pub mod record;

pub use context::UsageContext;
pub use pricing::calculate_price;
pub use record::{record_best_effort, CallContext, UsageRecord, UsageSink, DEFAULT_SCENARIO};
