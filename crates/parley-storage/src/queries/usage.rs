// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage ledger writes and roll-up reads.

use parley_core::ParleyError;
use parley_usage::UsageRecord;
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

use crate::database::{map_tr_err, Database};
use crate::queries::decimal_text;

/// Append a usage record and fold its counters into the catalog rows.
///
/// One transaction covers the ledger insert, the request-context row, the
/// model token counters, and the provider's accrued `total_price`. Records
/// referencing unknown models or providers still land in the ledger; the
/// counter updates are no-ops.
pub async fn insert_record(db: &Database, record: &UsageRecord) -> Result<(), ParleyError> {
    let record = record.clone();
    let context = match &record.context {
        Some(context) => Some((
            serde_json::to_string(&context.messages)?,
            serde_json::to_string(&serde_json::json!({
                "temperature": context.temperature,
                "max_tokens": context.max_tokens,
            }))?,
        )),
        None => None,
    };
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO usage_records \
                 (id, session_id, application_scenario, model_id, provider_id, \
                  input_tokens, output_tokens, price, elapsed_ms, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.session_id,
                    record.application_scenario,
                    record.model_id,
                    record.provider_id,
                    record.input_tokens,
                    record.output_tokens,
                    record.price.to_string(),
                    record.elapsed_ms as i64,
                    record.created_at,
                ],
            )?;
            if let Some((messages, model_params)) = &context {
                tx.execute(
                    "INSERT INTO usage_contexts (record_id, messages, params) \
                     VALUES (?1, ?2, ?3)",
                    params![record.id, messages, model_params],
                )?;
            }
            tx.execute(
                "UPDATE llm_model SET input_tokens = input_tokens + ?1, \
                 output_tokens = output_tokens + ?2 WHERE model_id = ?3",
                params![record.input_tokens, record.output_tokens, record.model_id],
            )?;
            let total: Option<String> = tx
                .query_row(
                    "SELECT total_price FROM llm_provider WHERE id = ?1",
                    params![record.provider_id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(total) = total {
                let accrued = decimal_text(0, &total)? + record.price;
                tx.execute(
                    "UPDATE llm_provider SET total_price = ?1 WHERE id = ?2",
                    params![accrued.to_string(), record.provider_id],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// The stored request context for one ledger row: JSON message list and
/// JSON model params, or `None` when the caller captured nothing.
pub async fn record_context(
    db: &Database,
    record_id: &str,
) -> Result<Option<(String, String)>, ParleyError> {
    let record_id = record_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT messages, params FROM usage_contexts WHERE record_id = ?1",
                params![record_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Total spend recorded for one session.
pub async fn session_total(db: &Database, session_id: &str) -> Result<Decimal, ParleyError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT price FROM usage_records WHERE session_id = ?1")?;
            let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;
            let mut total = Decimal::ZERO;
            for row in rows {
                total += decimal_text(0, &row?)?;
            }
            Ok(total)
        })
        .await
        .map_err(map_tr_err)
}

/// Number of ledger rows recorded for one model.
pub async fn model_record_count(db: &Database, model_id: &str) -> Result<i64, ParleyError> {
    let model_id = model_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COALESCE(COUNT(*), 0) FROM usage_records WHERE model_id = ?1",
                params![model_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}
