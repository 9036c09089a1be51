// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query operations, one module per concern.

pub mod catalog;
pub mod usage;

use rust_decimal::Decimal;

/// Parse a TEXT-encoded decimal column, keeping the rusqlite error shape.
pub(crate) fn decimal_text(idx: usize, text: &str) -> Result<Decimal, rusqlite::Error> {
    text.parse::<Decimal>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
