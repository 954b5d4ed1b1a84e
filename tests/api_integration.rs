//! Integration tests for the HTTP surface over in-memory stores.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use aqi_dashboard::fallback::Conditions;
use aqi_dashboard::{build_router, AppState};
use common::AppConfig;
use store::{DualStoreSync, MemoryDurableStore, MemoryLiveStore, SyncSettings};

struct TestApp {
    router: Router,
    durable: Arc<MemoryDurableStore>,
    live: Arc<MemoryLiveStore>,
}

fn test_app() -> TestApp {
    let config = AppConfig::default();
    let durable = Arc::new(MemoryDurableStore::new());
    let live = Arc::new(MemoryLiveStore::new());
    let settings = SyncSettings {
        durable_timeout: Duration::from_millis(200),
        mirror_timeout: Duration::from_millis(100),
        ..SyncSettings::from_config(&config.sync)
    };
    let sync = DualStoreSync::new(durable.clone(), live.clone(), settings);
    let conditions = Conditions::new(config.defaults.clone(), Duration::from_secs(60));
    let state = AppState::new(config, sync, conditions, None);

    TestApp {
        router: build_router(state),
        durable,
        live,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn reading(station: &str, aqi: f64) -> Value {
    json!({
        "stationId": station,
        "aqi": aqi,
        "pollutants": { "pm25": 196, "pm10": 315 },
        "source": "sensor"
    })
}

#[tokio::test]
async fn test_health_reports_backends() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["scraperEnabled"], false);
}

#[tokio::test]
async fn test_weather_and_aqi_fall_back_to_defaults() {
    let app = test_app();

    let (status, body) = send(&app.router, get("/api/weather")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["source"], "default");

    let (status, body) = send(&app.router, get("/api/aqi")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["source"], "default");
}

#[tokio::test]
async fn test_history_rejects_bad_queries_without_touching_store() {
    let app = test_app();

    let (status, body) = send(&app.router, get("/api/history?station=nowhere")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app.router, get("/api/history")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let inverted = "/api/history?station=ito&range=custom&start=2025-11-02&end=2025-11-01";
    let (status, _) = send(&app.router, get(inverted)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let too_long = "/api/history?station=ito&range=custom&start=2025-01-01&end=2025-06-01";
    let (status, body) = send(&app.router, get(too_long)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app.router, get("/api/history?station=ito&range=fortnight")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.durable.query_count(), 0);
}

#[tokio::test]
async fn test_sync_then_history_round_trip() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        json_request(Method::POST, "/api/readings/sync", reading("ito", 287.0)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["mirrored"], true);
    assert!(body["data"]["documentId"].as_str().is_some_and(|id| !id.is_empty()));

    let live = app.live.snapshot();
    assert_eq!(live.get("ito").map(|s| s.aqi), Some(287.0));

    let (status, body) = send(&app.router, get("/api/history?station=ito")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stationId"], "ito");
    assert_eq!(body["data"]["count"], 1);
    assert_eq!(body["data"]["readings"][0]["aqi"], 287.0);
}

#[tokio::test]
async fn test_mirror_failure_still_succeeds() {
    let app = test_app();
    app.live.set_failing(true);

    let (status, body) = send(
        &app.router,
        json_request(Method::POST, "/api/readings/sync", reading("ito", 150.0)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["mirrored"], false);
    assert_eq!(app.durable.readings().len(), 1);
    assert!(app.live.snapshot().is_empty());
}

#[tokio::test]
async fn test_durable_failure_is_bad_gateway() {
    let app = test_app();
    app.durable.set_failing(true);

    let (status, body) = send(
        &app.router,
        json_request(Method::POST, "/api/readings/sync", reading("ito", 150.0)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "STORAGE_ERROR");
    assert!(app.live.snapshot().is_empty());
}

#[tokio::test]
async fn test_invalid_sync_body_is_rejected() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        json_request(Method::POST, "/api/readings/sync", reading("ito", 900.0)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["field"], "aqi");

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/api/readings/sync")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app.router, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(app.durable.readings().is_empty());
}

#[tokio::test]
async fn test_validate_batch_reports_per_item() {
    let app = test_app();

    let batch = json!([
        reading("ito", 120.0),
        { "stationId": "", "aqi": -4, "pollutants": { "pm25": 10 } },
        reading("rohini", 80.0)
    ]);
    let (status, body) = send(&app.router, json_request(Method::POST, "/api/readings", batch)).await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["total"], 3);
    assert_eq!(data["valid"], 2);
    assert_eq!(data["invalid"], 1);
    assert_eq!(data["results"][1]["valid"], false);
    assert!(data["results"][1]["errors"].as_array().is_some_and(|e| e.len() >= 3));
    assert!(data["results"][0].get("errors").is_none());

    assert!(app.durable.readings().is_empty());

    let (status, _) = send(&app.router, json_request(Method::POST, "/api/readings", json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_station_upsert_keeps_created_at() {
    let app = test_app();

    let (status, _) = send(&app.router, get("/api/stations/ito")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, first) = send(
        &app.router,
        json_request(Method::PUT, "/api/stations/ito", json!({ "name": "ITO", "location": "Delhi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["data"]["category"], "urban");

    let (status, second) = send(
        &app.router,
        json_request(Method::PUT, "/api/stations/ito", json!({ "name": "ITO Crossing", "active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["data"]["name"], "ITO Crossing");
    assert_eq!(second["data"]["active"], false);
    assert_eq!(second["data"]["createdAt"], first["data"]["createdAt"]);

    let (status, fetched) = send(&app.router, get("/api/stations/ito")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["data"]["name"], "ITO Crossing");

    let (status, _) = send(
        &app.router,
        json_request(Method::PUT, "/api/stations/ito", json!({ "name": "  " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.router,
        json_request(Method::PUT, "/api/stations/a.b", json!({ "name": "Dotted" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"][0]["field"], "id");
}

#[tokio::test]
async fn test_station_stats_and_listing() {
    let app = test_app();

    for aqi in [100.0, 200.0] {
        let (status, _) = send(
            &app.router,
            json_request(Method::POST, "/api/readings/sync", reading("ito", aqi)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app.router, get("/api/stations/ito/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["days"], 7);
    assert_eq!(body["data"]["count"], 2);
    assert_eq!(body["data"]["average"], 150.0);
    assert_eq!(body["data"]["min"], 100.0);
    assert_eq!(body["data"]["max"], 200.0);

    let (status, _) = send(&app.router, get("/api/stations/ito/stats?days=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app.router, get("/api/stations/rohini/stats?days=30")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 0);
    assert_eq!(body["data"]["average"], 0.0);

    let (status, body) = send(&app.router, get("/api/stations")).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body["data"].as_array().cloned().unwrap_or_default();
    let ito = listed.iter().find(|s| s["id"] == "ito").cloned().unwrap_or_default();
    assert_eq!(ito["live"]["aqi"], 200.0);
}
