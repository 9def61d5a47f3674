use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use server_api::{auth::resolve_principal, evaluate, GateDecision};
use shared::error::ApiError;
use tracing::{debug, warn};

use crate::{app_state::AppState, reject};

pub(crate) const SESSION_COOKIE: &str = "session";

/// Runs every request through the access gate. Allowed requests carry the
/// resolved [`server_api::Principal`] as an extension.
pub(crate) async fn access_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let principal = match session_token(request.headers()) {
        Some(token) => match resolve_principal(&state.api, &token).await {
            Ok(principal) => principal,
            Err(error) => return reject(error).into_response(),
        },
        None => None,
    };

    match evaluate(principal.as_ref(), &path) {
        GateDecision::Allow => {
            if let Some(principal) = principal {
                request.extensions_mut().insert(principal);
            }
            next.run(request).await
        }
        GateDecision::Redirect(to) => {
            debug!(%path, to, "gate redirect");
            Redirect::to(to).into_response()
        }
        GateDecision::Forbidden => {
            warn!(
                %path,
                user_id = principal.as_ref().map(|p| p.user_id.0),
                "admin route denied"
            );
            (StatusCode::FORBIDDEN, Json(ApiError::forbidden())).into_response()
        }
    }
}

/// The session token from the `session` cookie, falling back to a bearer
/// `Authorization` header.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(|token| token.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

pub(crate) fn session_cookie(token: &str, max_age_seconds: i64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}")
}

pub(crate) fn cleared_session_cookie() -> String {
    session_cookie("", 0)
}
