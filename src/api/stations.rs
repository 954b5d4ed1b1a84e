//! Station metadata, stats, and live snapshot endpoints.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use common::{AqiStats, LiveStation, StationMetadata, StationUpsert};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::Envelope;
use crate::state::AppState;

const DEFAULT_STATS_DAYS: u32 = 7;
const MAX_STATS_DAYS: u32 = 365;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/stations", get(list_stations))
        .route("/stations/{id}", get(get_station).put(put_station))
        .route("/stations/{id}/stats", get(station_stats))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveStation>,
}

/// Configured stations with their latest mirrored reading, if any.
async fn list_stations(State(state): State<AppState>) -> Json<Envelope<Vec<StationSummary>>> {
    let mut live = match state.sync.live_stations().await {
        Ok(map) => map,
        Err(e) => {
            warn!("Live snapshot unavailable: {}", e);
            Default::default()
        }
    };
    let summaries = state
        .config
        .stations
        .iter()
        .map(|s| StationSummary {
            id: s.id.clone(),
            name: s.name.clone(),
            live: live.remove(&s.id),
        })
        .collect();
    Json(Envelope::ok(summaries))
}

async fn get_station(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<StationMetadata>>> {
    let station = state
        .sync
        .station(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("station", &id))?;
    Ok(Json(Envelope::ok(station)))
}

async fn put_station(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Envelope<StationMetadata>>> {
    let input: StationUpsert = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid station body: {e}")))?;
    let station = state.sync.upsert_station(&id, input, Utc::now()).await?;
    Ok(Json(Envelope::ok(station)))
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub days: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub station_id: String,
    pub days: u32,
    #[serde(flatten)]
    pub stats: AqiStats,
}

async fn station_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StatsParams>,
) -> ApiResult<Json<Envelope<StatsResponse>>> {
    let days = match params.days.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_STATS_DAYS,
        Some(raw) => match raw.parse::<u32>() {
            Ok(d) if (1..=MAX_STATS_DAYS).contains(&d) => d,
            _ => {
                return Err(common::Error::invalid(
                    "days",
                    format!("must be an integer between 1 and {MAX_STATS_DAYS}"),
                )
                .into())
            }
        },
    };
    if !state.config.is_known_station(&id) {
        return Err(ApiError::not_found("station", &id));
    }

    let stats = state.sync.stats(&id, days, Utc::now()).await?;
    Ok(Json(Envelope::ok(StatsResponse {
        station_id: id,
        days,
        stats,
    })))
}
