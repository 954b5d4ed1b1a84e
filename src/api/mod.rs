//! HTTP surface.

pub mod error;
pub mod history;
pub mod live;
pub mod ops;
pub mod readings;
pub mod stations;
pub mod types;
pub mod weather;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = weather::routes()
        .merge(history::routes())
        .merge(readings::routes())
        .merge(stations::routes())
        .merge(live::routes());

    let router = Router::new()
        .merge(ops::routes())
        .nest("/api", api)
        .layer(TraceLayer::new_for_http());

    let router = if state.config.server.permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    };

    router.with_state(state)
}
