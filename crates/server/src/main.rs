use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use server_api::{
    access::{DASHBOARD_ROUTE, LOGIN_ROUTE, OVERVIEW_ROUTE},
    admin, auth,
    dashboard::{load_overview, DashboardQuery, DashboardState, SortColumn},
    onboarding,
    work_orders::{circuits_by_status, planned_units, status_taxonomy},
    ApiContext, Principal, SessionConfig,
};
use shared::{
    domain::{Role, UserId, UserSummary},
    error::{ApiError, ErrorCode},
    protocol::{
        CompleteOnboardingRequest, DashboardView, LoginRequest, LoginResponse, OnboardingStatus,
        RoleChangeRequest,
    },
    status::StatusDescriptor,
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use workstudio::{
    Circuit, Credentials, CredentialsInfo, HttpWorkStudioClient, InMemoryWorkStudio, PlannedUnit,
    ViewFilter, WorkStudioApi,
};

mod app_state;
mod config;
mod gate;

use app_state::AppState;
use config::{load_settings, prepare_database_url, Settings, DEV_SESSION_SECRET};
use gate::{access_gate, cleared_session_cookie, session_cookie};

const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
struct CircuitsQuery {
    status: String,
}

#[derive(Debug, Serialize)]
struct LoginForm {
    action: &'static str,
    fields: [&'static str; 2],
}

#[derive(Debug, Serialize, Deserialize)]
struct HealthReport {
    healthy: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    if settings.session_secret == DEV_SESSION_SECRET {
        warn!("using the development session secret; set APP__SESSION_SECRET in production");
    }
    let api = ApiContext {
        storage,
        workstudio: workstudio_client(&settings)?,
        sessions: SessionConfig {
            secret: settings.session_secret.clone(),
            ttl_seconds: settings.session_ttl_seconds,
        },
    };

    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn workstudio_client(settings: &Settings) -> anyhow::Result<Arc<dyn WorkStudioApi>> {
    match settings.workstudio_base_url.as_deref() {
        Some(base_url) => {
            let client = settings.workstudio_users.iter().fold(
                HttpWorkStudioClient::new(
                    base_url,
                    Credentials::new(
                        settings.workstudio_username.clone(),
                        settings.workstudio_password.clone(),
                    ),
                    Duration::from_secs(settings.workstudio_timeout_seconds),
                )?,
                |client, (user_id, login)| {
                    client.with_user_credentials(
                        UserId(*user_id),
                        Credentials::new(login.username.clone(), login.password.clone()),
                    )
                },
            );
            info!(
                base_url = %client.base_url(),
                user_credentials = client.user_credentials_count(),
                "using WorkStudio gateway"
            );
            Ok(Arc::new(client))
        }
        None => {
            warn!("no WorkStudio base url configured; serving demo data");
            Ok(Arc::new(InMemoryWorkStudio::demo()))
        }
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(root))
        .route("/login", get(login_form).post(login))
        .route("/logout", post(logout))
        .route(
            "/onboarding",
            get(http_onboarding_status).post(http_complete_onboarding),
        )
        .route("/dashboard", get(dashboard))
        .route("/assessments/overview", get(http_overview))
        .route("/assessments/overview/sort/:column", get(http_overview_sort))
        .route("/statuses", get(http_statuses))
        .route("/circuits", get(http_circuits))
        .route(
            "/work-orders/:work_order/planned-units",
            get(http_planned_units),
        )
        .route("/admin/users", get(http_admin_users))
        .route("/admin/users/:user_id/roles", post(http_grant_role))
        .route("/admin/users/:user_id/roles/:role", delete(http_revoke_role))
        .route("/admin/workstudio/health", get(http_workstudio_health))
        .route(
            "/admin/workstudio/credentials",
            get(http_workstudio_credentials),
        )
        .route("/admin/workstudio/views/:view_guid", post(http_workstudio_view))
        .layer(middleware::from_fn_with_state(state.clone(), access_gate))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn reject(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match error.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Upstream => StatusCode::BAD_GATEWAY,
        ErrorCode::Internal => {
            error!(message = %error.message, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(error))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    match state.api.storage.health_check().await {
        Ok(()) => "ok".into_response(),
        Err(error) => {
            error!(%error, "storage health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable").into_response()
        }
    }
}

async fn root() -> Redirect {
    Redirect::to(DASHBOARD_ROUTE)
}

async fn login_form() -> Json<LoginForm> {
    Json(LoginForm {
        action: LOGIN_ROUTE,
        fields: ["username", "password"],
    })
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<Response> {
    let response: LoginResponse = auth::login(&state.api, &req.username, &req.password)
        .await
        .map_err(reject)?;
    let cookie = session_cookie(&response.token, state.api.sessions.ttl_seconds);
    Ok(([(header::SET_COOKIE, cookie)], Json(response)).into_response())
}

async fn logout(Extension(principal): Extension<Principal>) -> Response {
    info!(user_id = principal.user_id.0, "user logged out");
    (
        [(header::SET_COOKIE, cleared_session_cookie())],
        Redirect::to(LOGIN_ROUTE),
    )
        .into_response()
}

async fn http_onboarding_status(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> HttpResult<Json<OnboardingStatus>> {
    onboarding::onboarding_status(&state.api, principal.user_id)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_complete_onboarding(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CompleteOnboardingRequest>,
) -> HttpResult<Redirect> {
    onboarding::complete_onboarding(&state.api, principal.user_id, &req)
        .await
        .map_err(reject)?;
    Ok(Redirect::to(DASHBOARD_ROUTE))
}

async fn dashboard() -> Redirect {
    Redirect::to(OVERVIEW_ROUTE)
}

async fn http_overview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DashboardQuery>,
) -> HttpResult<Json<DashboardView>> {
    let dashboard = DashboardState::from_query(&query);
    load_overview(&state.api, &dashboard)
        .await
        .map(Json)
        .map_err(reject)
}

/// Applies a header click to the state in the query string and redirects to
/// the resulting overview URL.
async fn http_overview_sort(
    Path(column): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> HttpResult<Redirect> {
    let column = SortColumn::parse(&column).ok_or_else(|| {
        reject(ApiError::new(
            ErrorCode::Validation,
            format!("unknown sort column: {column}"),
        ))
    })?;
    let mut dashboard = DashboardState::from_query(&query);
    dashboard.sort(column);
    Ok(Redirect::to(&format!(
        "{OVERVIEW_ROUTE}?{}",
        dashboard.to_query()
    )))
}

async fn http_statuses() -> Json<Vec<StatusDescriptor>> {
    Json(status_taxonomy())
}

async fn http_circuits(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<CircuitsQuery>,
) -> HttpResult<Json<Vec<Circuit>>> {
    circuits_by_status(&state.api, &principal, &query.status)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_planned_units(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(work_order): Path<String>,
) -> HttpResult<Json<Vec<PlannedUnit>>> {
    planned_units(&state.api, &principal, &work_order)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_admin_users(
    State(state): State<Arc<AppState>>,
) -> HttpResult<Json<Vec<UserSummary>>> {
    admin::list_users(&state.api).await.map(Json).map_err(reject)
}

async fn http_grant_role(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<i64>,
    Json(req): Json<RoleChangeRequest>,
) -> HttpResult<Json<UserSummary>> {
    admin::grant_role(&state.api, &principal, UserId(user_id), req.role)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_revoke_role(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path((user_id, role)): Path<(i64, String)>,
) -> HttpResult<Json<UserSummary>> {
    let role = role
        .parse::<Role>()
        .map_err(|e| reject(ApiError::from(e)))?;
    admin::revoke_role(&state.api, &principal, UserId(user_id), role)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_workstudio_health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(HealthReport {
        healthy: admin::workstudio_health(&state.api).await,
    })
}

async fn http_workstudio_credentials(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Json<CredentialsInfo> {
    Json(admin::workstudio_credentials(&state.api, &principal).await)
}

async fn http_workstudio_view(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(view_guid): Path<String>,
    Json(filter): Json<ViewFilter>,
) -> HttpResult<Json<serde_json::Value>> {
    admin::workstudio_view_data(&state.api, &principal, &view_guid, &filter)
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
