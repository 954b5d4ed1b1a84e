//! Station history endpoint.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use common::{FieldIssue, HistoryPoint};
use serde::{Deserialize, Serialize};
use store::range::parse_bound;
use store::RangeKind;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::Envelope;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/history", get(history))
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub station: Option<String>,
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub station_id: String,
    pub range: String,
    pub count: usize,
    pub readings: Vec<HistoryPoint>,
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<Json<Envelope<HistoryResponse>>> {
    let mut issues = Vec::new();

    let station = params.station.as_deref().map(str::trim).unwrap_or_default();
    if station.is_empty() {
        issues.push(FieldIssue::new("station", "is required"));
    } else if !state.config.is_known_station(station) {
        issues.push(FieldIssue::new("station", format!("unknown station '{station}'")));
    }

    let range_raw = params.range.as_deref().unwrap_or("24h");
    let kind = match RangeKind::parse(range_raw) {
        Ok(kind) => kind,
        Err(common::Error::Validation(mut found)) => {
            issues.append(&mut found);
            RangeKind::default()
        }
        Err(e) => return Err(e.into()),
    };

    let mut bound = |field: &str, raw: Option<&str>| match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => None,
        Some(r) => match parse_bound(field, r) {
            Ok(dt) => Some(dt),
            Err(common::Error::Validation(mut found)) => {
                issues.append(&mut found);
                None
            }
            Err(_) => None,
        },
    };
    let start = bound("start", params.start.as_deref());
    let end = bound("end", params.end.as_deref());

    let limit = match params.limit.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) => Some(n),
            Err(_) => {
                issues.push(FieldIssue::new("limit", "must be a non-negative integer"));
                None
            }
        },
    };

    if !issues.is_empty() {
        return Err(ApiError::Validation(issues));
    }

    let readings = state
        .sync
        .history_range(station, kind, start, end, limit, Utc::now())
        .await?;

    Ok(Json(Envelope::ok(HistoryResponse {
        station_id: station.to_string(),
        range: range_raw.to_ascii_lowercase(),
        count: readings.len(),
        readings,
    })))
}
