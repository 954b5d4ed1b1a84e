//! Server-sent events relay of the live mirror.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{self, Stream};
use tracing::debug;

use crate::api::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/live", get(live_stream))
}

/// Emits a `stations` event with the full map on connect and on every
/// change. Intermediate states may be coalesced.
async fn live_stream(
    State(state): State<AppState>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = state.sync.watch().await?;

    let events = stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            debug!("Live mirror closed; ending event stream");
            return None;
        }
        let snapshot = rx.borrow_and_update().clone();
        let event = Event::default()
            .event("stations")
            .json_data(&snapshot)
            .unwrap_or_else(|_| Event::default().comment("encode failed"));
        Some((Ok(event), (rx, false)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
