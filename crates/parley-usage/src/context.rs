// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-session usage aggregation.

use std::collections::HashMap;

use parley_core::MessageUsage;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Running usage totals for one session.
///
/// Lives inside the session blob and travels with it through the KV
/// store. Entries accumulate for the lifetime of the session; sessions
/// are short-lived enough that no pruning is done.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageContext {
    /// Per-agent usage, keyed by agent id.
    #[serde(default)]
    pub by_agent: HashMap<String, MessageUsage>,
    /// Totals across all agents.
    #[serde(default)]
    pub totals: MessageUsage,
}

impl UsageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one message's usage under the given agent.
    pub fn add(&mut self, agent_id: &str, usage: &MessageUsage) {
        let entry = self.by_agent.entry(agent_id.to_string()).or_default();
        accumulate(entry, usage);
        accumulate(&mut self.totals, usage);
    }

    /// Total price across all agents, zero when nothing was priced.
    pub fn total_price(&self) -> Decimal {
        self.totals.price.unwrap_or_default()
    }
}

fn accumulate(into: &mut MessageUsage, usage: &MessageUsage) {
    into.input_tokens += usage.input_tokens;
    into.output_tokens += usage.output_tokens;
    into.total_tokens += usage.total_tokens;
    if let Some(price) = usage.price {
        into.price = Some(into.price.unwrap_or_default() + price);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usage(input: i64, output: i64, price: Option<Decimal>) -> MessageUsage {
        MessageUsage {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
            price,
        }
    }

    #[test]
    fn accumulates_per_agent_and_totals() {
        let mut ctx = UsageContext::new();
        ctx.add("host", &usage(100, 40, Some(dec!(0.001))));
        ctx.add("player_1", &usage(50, 20, Some(dec!(0.0005))));
        ctx.add("host", &usage(10, 5, None));

        assert_eq!(ctx.by_agent["host"].input_tokens, 110);
        assert_eq!(ctx.by_agent["host"].price, Some(dec!(0.001)));
        assert_eq!(ctx.totals.total_tokens, 225);
        assert_eq!(ctx.total_price(), dec!(0.0015));
    }

    #[test]
    fn round_trips_through_json() {
        let mut ctx = UsageContext::new();
        ctx.add("judge", &usage(7, 3, Some(dec!(0.00000021))));
        let json = serde_json::to_string(&ctx).unwrap();
        let back: UsageContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.totals.input_tokens, 7);
        assert_eq!(back.total_price(), dec!(0.00000021));
    }
}
