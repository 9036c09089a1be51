// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Price calculation from per-1K-token rates.
//!
//! Rates come from the model catalog, not from a hardcoded table, so
//! operators can price self-hosted or gateway models freely.

use rust_decimal::Decimal;

/// Decimal places kept on calculated prices.
const PRICE_SCALE: u32 = 8;

/// Calculate the price of one LLM call.
///
/// Formula: `input_tokens / 1000 * input_price + output_tokens / 1000 *
/// output_price`, rounded half-up to 8 decimal places. Negative token
/// counts are clamped to zero.
pub fn calculate_price(
    input_tokens: i64,
    output_tokens: i64,
    input_price_per_1k: Decimal,
    output_price_per_1k: Decimal,
) -> Decimal {
    let thousand = Decimal::from(1000);
    let input = Decimal::from(input_tokens.max(0)) / thousand * input_price_per_1k;
    let output = Decimal::from(output_tokens.max(0)) / thousand * output_price_per_1k;
    (input + output).round_dp(PRICE_SCALE)
}
