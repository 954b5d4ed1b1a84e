//! Current conditions endpoints.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use common::{CurrentAqi, WeatherReport};

use crate::api::types::Envelope;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/weather", get(current_weather))
        .route("/aqi", get(current_aqi))
}

/// Never fails; the last tier is static defaults.
async fn current_weather(State(state): State<AppState>) -> Json<Envelope<WeatherReport>> {
    Json(Envelope::ok(state.conditions.weather(Utc::now()).await))
}

async fn current_aqi(State(state): State<AppState>) -> Json<Envelope<CurrentAqi>> {
    Json(Envelope::ok(state.conditions.aqi(Utc::now()).await))
}
