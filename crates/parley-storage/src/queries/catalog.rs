// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog record CRUD backing the [`parley_core::traits::ConfigSource`] seam.

use parley_core::records::{
    ModelRecord, PromptRecord, ProviderRecord, RoleRecord, SystemConfigRecord,
};
use parley_core::ParleyError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::queries::decimal_text;

fn provider_from_row(row: &rusqlite::Row<'_>) -> Result<ProviderRecord, rusqlite::Error> {
    let total_price: String = row.get(7)?;
    Ok(ProviderRecord {
        id: row.get(0)?,
        provider_name: row.get(1)?,
        api_key: row.get(2)?,
        base_url: row.get(3)?,
        model_name: row.get(4)?,
        provider_sign: row.get(5)?,
        status: row.get(6)?,
        total_price: decimal_text(7, &total_price)?,
    })
}

fn model_from_row(row: &rusqlite::Row<'_>) -> Result<ModelRecord, rusqlite::Error> {
    let input_price: String = row.get(3)?;
    let output_price: String = row.get(4)?;
    Ok(ModelRecord {
        model_id: row.get(0)?,
        provider_id: row.get(1)?,
        display_name: row.get(2)?,
        input_price: decimal_text(3, &input_price)?,
        output_price: decimal_text(4, &output_price)?,
        status: row.get(5)?,
        input_tokens: row.get(6)?,
        output_tokens: row.get(7)?,
    })
}

fn role_from_row(row: &rusqlite::Row<'_>) -> Result<RoleRecord, rusqlite::Error> {
    let extras: String = row.get(6)?;
    let extras = serde_json::from_str(&extras).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(RoleRecord {
        role_id: row.get(0)?,
        name: row.get(1)?,
        setting: row.get(2)?,
        voice: row.get(3)?,
        model_id: row.get(4)?,
        status: row.get(5)?,
        extras,
    })
}

fn prompt_from_row(row: &rusqlite::Row<'_>) -> Result<PromptRecord, rusqlite::Error> {
    Ok(PromptRecord {
        id: row.get(0)?,
        role_id: row.get(1)?,
        level: row.get(2)?,
        prompt_text: row.get(3)?,
        prompt_type: row.get(4)?,
        status: row.get(5)?,
    })
}

const PROVIDER_COLS: &str =
    "id, provider_name, api_key, base_url, model_name, provider_sign, status, total_price";
const MODEL_COLS: &str =
    "model_id, provider_id, display_name, input_price, output_price, status, \
     input_tokens, output_tokens";
const ROLE_COLS: &str = "role_id, name, setting, voice, model_id, status, extras";
const PROMPT_COLS: &str = "id, role_id, level, prompt_text, prompt_type, status";

pub async fn list_providers(db: &Database) -> Result<Vec<ProviderRecord>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {PROVIDER_COLS} FROM llm_provider ORDER BY id"))?;
            let rows = stmt.query_map([], provider_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_provider(db: &Database, id: i64) -> Result<Option<ProviderRecord>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {PROVIDER_COLS} FROM llm_provider WHERE id = ?1"))?;
            match stmt.query_row(params![id], provider_from_row) {
                Ok(provider) => Ok(Some(provider)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a provider with an explicit id (seed/import path).
pub async fn insert_provider(db: &Database, record: &ProviderRecord) -> Result<(), ParleyError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO llm_provider \
                 (id, provider_name, api_key, base_url, model_name, provider_sign, status, total_price) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.provider_name,
                    record.api_key,
                    record.base_url,
                    record.model_name,
                    record.provider_sign,
                    record.status,
                    record.total_price.to_string(),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_models(db: &Database) -> Result<Vec<ModelRecord>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {MODEL_COLS} FROM llm_model ORDER BY model_id"))?;
            let rows = stmt.query_map([], model_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_model(db: &Database, model_id: &str) -> Result<Option<ModelRecord>, ParleyError> {
    let model_id = model_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {MODEL_COLS} FROM llm_model WHERE model_id = ?1"))?;
            match stmt.query_row(params![model_id], model_from_row) {
                Ok(model) => Ok(Some(model)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_model(db: &Database, record: &ModelRecord) -> Result<(), ParleyError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO llm_model \
                 (model_id, provider_id, display_name, input_price, output_price, status, \
                  input_tokens, output_tokens) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.model_id,
                    record.provider_id,
                    record.display_name,
                    record.input_price.to_string(),
                    record.output_price.to_string(),
                    record.status,
                    record.input_tokens,
                    record.output_tokens,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_roles(db: &Database) -> Result<Vec<RoleRecord>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {ROLE_COLS} FROM roles ORDER BY role_id"))?;
            let rows = stmt.query_map([], role_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_role(db: &Database, role_id: &str) -> Result<Option<RoleRecord>, ParleyError> {
    let role_id = role_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {ROLE_COLS} FROM roles WHERE role_id = ?1"))?;
            match stmt.query_row(params![role_id], role_from_row) {
                Ok(role) => Ok(Some(role)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_role(db: &Database, record: &RoleRecord) -> Result<(), ParleyError> {
    let record = record.clone();
    let extras = serde_json::to_string(&record.extras)?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO roles (role_id, name, setting, voice, model_id, status, extras) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.role_id,
                    record.name,
                    record.setting,
                    record.voice,
                    record.model_id,
                    record.status,
                    extras,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_prompts(db: &Database) -> Result<Vec<PromptRecord>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROMPT_COLS} FROM character_prompt ORDER BY role_id, level"
            ))?;
            let rows = stmt.query_map([], prompt_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn prompts_for_role(
    db: &Database,
    role_id: &str,
) -> Result<Vec<PromptRecord>, ParleyError> {
    let role_id = role_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROMPT_COLS} FROM character_prompt WHERE role_id = ?1 ORDER BY level"
            ))?;
            let rows = stmt.query_map(params![role_id], prompt_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn insert_prompt(db: &Database, record: &PromptRecord) -> Result<(), ParleyError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO character_prompt (id, role_id, level, prompt_text, prompt_type, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.role_id,
                    record.level,
                    record.prompt_text,
                    record.prompt_type,
                    record.status,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_system_configs(db: &Database) -> Result<Vec<SystemConfigRecord>, ParleyError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare("SELECT key, value FROM system_config ORDER BY key")?;
            let rows = stmt.query_map([], |row| {
                Ok(SystemConfigRecord {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a system config key.
pub async fn set_system_config(db: &Database, key: &str, value: &str) -> Result<(), ParleyError> {
    let key = key.to_string();
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO system_config (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
