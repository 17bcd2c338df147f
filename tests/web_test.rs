#![cfg(feature = "web")]

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::harness;
use http_body_util::BodyExt;
use keba_control::web::{AppState, build_router};
use std::sync::Arc;
use tower::ServiceExt;

async fn router(stations: &[&str]) -> (axum::Router, Arc<common::RecordingTransport>) {
    let h = harness(stations).await;
    let state = AppState {
        controller: Arc::new(h.controller),
    };
    (build_router(state), h.transport)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_ok() {
    let (router, _) = router(&[]).await;
    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn action_returns_outcome() {
    let (router, transport) = router(&["garage"]).await;
    let response = router
        .oneshot(post_json(
            "/api/actions/set_charging_power",
            serde_json::json!({"station": "garage", "power": 11}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["station"], "garage");
    assert_eq!(body["action"], "set_charging_power");
    assert_eq!(body["commands"][0]["kind"], "setCurrent");
    assert_eq!(body["derived"]["current"], 15.0);
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test]
async fn validation_errors_are_bad_request() {
    let (router, _) = router(&["garage"]).await;
    let response = router
        .oneshot(post_json(
            "/api/actions/set_current",
            serde_json::json!({"station": "garage", "current": 2}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["violations"][0]["field"], "current");
    assert_eq!(body["violations"][0]["code"], "out_of_range");
}

#[tokio::test]
async fn reserved_output_is_bad_request() {
    let (router, _) = router(&["garage"]).await;
    let response = router
        .oneshot(post_json(
            "/api/actions/set_output",
            serde_json::json!({"station": "garage", "out": 7}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "reserved_value");
}

#[tokio::test]
async fn unknown_action_and_station_are_not_found() {
    let (router, _) = router(&["garage"]).await;
    let response = router
        .clone()
        .oneshot(post_json(
            "/api/actions/reboot",
            serde_json::json!({"station": "garage"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/stations/carport")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "unknown_station");
}

#[tokio::test]
async fn transport_failure_is_bad_gateway() {
    let (router, transport) = router(&["garage"]).await;
    transport.fail_on("authorize");
    let response = router
        .oneshot(post_json(
            "/api/actions/start",
            serde_json::json!({"station": "garage"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"], "transport_failure");
}

#[tokio::test]
async fn cooldown_is_conflict() {
    let (router, _) = router(&["garage"]).await;
    let switch = || {
        post_json(
            "/api/actions/x2",
            serde_json::json!({"station": "garage", "three_phases": false}),
        )
    };
    let response = router.clone().oneshot(switch()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router.oneshot(switch()).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["error"], "cooldown_active");
    assert!(body["remaining_seconds"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn connection_report_and_snapshots() {
    let (router, _) = router(&["garage", "carport"]).await;
    let response = router
        .clone()
        .oneshot(post_json(
            "/api/stations/garage/connection",
            serde_json::json!({"plugged": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["plugged"], true);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/stations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    let stations = body.as_array().unwrap();
    assert_eq!(stations.len(), 2);
    assert_eq!(stations[0]["station"], "carport");
    assert_eq!(stations[1]["plugged"], true);
}

#[tokio::test]
async fn bodyless_action_reports_missing_station() {
    let (router, _) = router(&["garage"]).await;
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/actions/enable")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    // Without a body there is no station field
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["violations"][0]["field"], "station");
    assert_eq!(body["violations"][0]["code"], "missing");
}
