//! Reading validation and submit endpoints.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use common::{FieldIssue, Reading};
use serde::Serialize;
use serde_json::Value;
use store::{validate_value, SyncOutcome};

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::Envelope;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/readings", post(validate_readings))
        .route("/readings/sync", post(sync_reading))
}

fn parse_body(body: &Bytes) -> ApiResult<Value> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub index: usize,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<Reading>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldIssue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValidation {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub results: Vec<ItemResult>,
}

fn validate_item(index: usize, raw: &Value) -> ItemResult {
    match validate_value(raw, Utc::now()) {
        Ok(reading) => ItemResult {
            index,
            valid: true,
            reading: Some(reading),
            errors: Vec::new(),
        },
        Err(common::Error::Validation(errors)) => ItemResult {
            index,
            valid: false,
            reading: None,
            errors,
        },
        Err(other) => ItemResult {
            index,
            valid: false,
            reading: None,
            errors: vec![FieldIssue::new("body", other.to_string())],
        },
    }
}

/// Validate one reading or an array of readings. Nothing is persisted.
///
/// A single object answers 200 with the normalized reading or 400 with its
/// issues; an array always answers 200 with per-item results.
async fn validate_readings(body: Bytes) -> ApiResult<Json<Envelope<Value>>> {
    let raw = parse_body(&body)?;

    match raw {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ApiError::BadRequest("empty reading batch".into()));
            }
            let results: Vec<ItemResult> = items
                .iter()
                .enumerate()
                .map(|(i, item)| validate_item(i, item))
                .collect();
            let valid = results.iter().filter(|r| r.valid).count();
            let batch = BatchValidation {
                total: results.len(),
                valid,
                invalid: results.len() - valid,
                results,
            };
            let data = serde_json::to_value(batch).map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok(Json(Envelope::ok(data)))
        }
        single => {
            let reading = validate_value(&single, Utc::now())?;
            let data = serde_json::to_value(reading).map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok(Json(Envelope::ok(data)))
        }
    }
}

/// Validate, append to history, and mirror to the live store.
async fn sync_reading(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Envelope<SyncOutcome>>)> {
    let raw = parse_body(&body)?;
    let outcome = state.sync.submit_value(&raw).await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(outcome))))
}
