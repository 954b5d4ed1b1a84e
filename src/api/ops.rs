//! Liveness endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.config;
    Json(json!({
        "status": "ok",
        "firestore": cfg.firebase.has_firestore(),
        "realtimeDb": cfg.firebase.has_realtime_db(),
        "scraperEnabled": state.scraper.is_some(),
        "accuweather": !cfg.weather.accuweather_api_key.is_empty(),
        "waqi": !cfg.weather.waqi_token.is_empty(),
    }))
}
