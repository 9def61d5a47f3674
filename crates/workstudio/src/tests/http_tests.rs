use std::sync::{Arc, Mutex};

use anyhow::Result as AnyResult;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tokio::net::TcpListener;

use super::*;

#[derive(Clone, Default)]
struct GatewayState {
    authorizations: Arc<Mutex<Vec<String>>>,
}

impl GatewayState {
    fn record(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.authorizations.lock().expect("lock").push(value);
    }

    fn last_authorization(&self) -> String {
        self.authorizations
            .lock()
            .expect("lock")
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    status: String,
}

async fn gateway_circuits(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(q): Query<StatusQuery>,
) -> Json<serde_json::Value> {
    state.record(&headers);
    Json(serde_json::json!([
        {
            "work_order": "2026-0142",
            "title": "Feeder 12",
            "status": q.status,
            "total_miles": 12.5
        }
    ]))
}

async fn gateway_planned_units(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(work_order): Path<String>,
) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
    state.record(&headers);
    if work_order == "missing" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(serde_json::json!([
        { "work_order": work_order, "unit": "SPM", "quantity": 3.0 }
    ])))
}

async fn gateway_view(
    Path(view_guid): Path<String>,
    Json(filter): Json<ViewFilter>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "guid": view_guid, "filter": filter }))
}

async fn spawn_gateway(healthy: bool) -> AnyResult<(String, GatewayState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = GatewayState::default();
    let app = Router::new()
        .route(
            "/ws/health",
            get(move || async move {
                if healthy {
                    StatusCode::OK
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        )
        .route("/ws/circuits", get(gateway_circuits))
        .route(
            "/ws/work-orders/:work_order/planned-units",
            get(gateway_planned_units),
        )
        .route("/ws/views/:view_guid", post(gateway_view))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/ws"), state))
}

fn client(base_url: &str) -> HttpWorkStudioClient {
    HttpWorkStudioClient::new(
        base_url,
        Credentials::new("svc", "svc-pass"),
        Duration::from_secs(5),
    )
    .expect("client")
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

#[test]
fn rejects_base_urls_that_cannot_hold_paths() {
    let err = HttpWorkStudioClient::new(
        "mailto:ops@example.com",
        Credentials::new("svc", "x"),
        Duration::from_secs(1),
    )
    .err()
    .expect("should fail");
    assert!(matches!(err, WorkStudioError::InvalidBaseUrl(_)));
}

#[test]
fn base_url_gains_trailing_slash() {
    let client = client("https://workstudio.example.com/api");
    assert_eq!(client.base_url().as_str(), "https://workstudio.example.com/api/");
    assert_eq!(
        client.endpoint(&["work-orders", "A B", "planned-units"]).as_str(),
        "https://workstudio.example.com/api/work-orders/A%20B/planned-units"
    );
}

#[tokio::test]
async fn health_check_reflects_gateway_status() {
    let (healthy_url, _) = spawn_gateway(true).await.expect("gateway");
    assert!(client(&healthy_url).health_check().await);

    let (sick_url, _) = spawn_gateway(false).await.expect("gateway");
    assert!(!client(&sick_url).health_check().await);
}

#[tokio::test]
async fn health_check_is_false_when_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    assert!(!client(&format!("http://{addr}")).health_check().await);
}

#[tokio::test]
async fn circuits_use_service_credentials_by_default() {
    let (url, state) = spawn_gateway(true).await.expect("gateway");
    let circuits = client(&url)
        .get_circuits_by_status(WorkStudioStatus::QualityControl, None)
        .await
        .expect("circuits");

    assert_eq!(circuits.len(), 1);
    assert_eq!(circuits[0].status, WorkStudioStatus::QualityControl);
    assert_eq!(state.last_authorization(), basic("svc", "svc-pass"));
}

#[tokio::test]
async fn per_user_credentials_are_used_when_registered() {
    let (url, state) = spawn_gateway(true).await.expect("gateway");
    let client =
        client(&url).with_user_credentials(UserId(7), Credentials::new("planner7", "pw7"));

    client
        .get_planned_units("2026-0142", Some(UserId(7)))
        .await
        .expect("units");
    assert_eq!(state.last_authorization(), basic("planner7", "pw7"));

    client
        .get_planned_units("2026-0142", Some(UserId(8)))
        .await
        .expect("units");
    assert_eq!(state.last_authorization(), basic("svc", "svc-pass"));
}

#[tokio::test]
async fn missing_work_order_maps_to_not_found() {
    let (url, _) = spawn_gateway(true).await.expect("gateway");
    let err = client(&url)
        .get_planned_units("missing", None)
        .await
        .expect_err("should fail");
    assert!(matches!(err, WorkStudioError::NotFound(_)));
}

#[tokio::test]
async fn view_data_posts_the_filter() {
    let (url, _) = spawn_gateway(true).await.expect("gateway");
    let data = client(&url)
        .get_view_data(
            "5f0c-guid",
            &ViewFilter::by_status(WorkStudioStatus::Rework),
            None,
        )
        .await
        .expect("view");
    assert_eq!(data["guid"], "5f0c-guid");
    assert_eq!(data["filter"]["value"], "REWRK");
}

#[tokio::test]
async fn credentials_info_reports_service_account() {
    let info = client("http://127.0.0.1:9")
        .get_current_credentials_info(None)
        .await;
    assert_eq!(info.kind, CredentialKind::Service);
    assert_eq!(info.username, "svc");
    assert_eq!(info.user_id, None);
}

#[tokio::test]
async fn credentials_info_reports_registered_user_account() {
    let client = client("http://127.0.0.1:9")
        .with_user_credentials(UserId(7), Credentials::new("planner7", "pw7"));
    assert_eq!(client.user_credentials_count(), 1);

    let info = client.get_current_credentials_info(Some(UserId(7))).await;
    assert_eq!(info.kind, CredentialKind::User);
    assert_eq!(info.username, "planner7");
    assert_eq!(info.user_id, Some(UserId(7)));

    let info = client.get_current_credentials_info(Some(UserId(8))).await;
    assert_eq!(info.kind, CredentialKind::Service);
    assert_eq!(info.username, "svc");
}
