use super::*;
use axum::{
    body::{self, Body},
    http::Request,
};
use chrono::{NaiveDate, Utc};
use server_api::auth::{hash_password, mint_session_token};
use shared::domain::RegionalWeeklyAggregate;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    storage: Storage,
    sessions: SessionConfig,
}

impl TestApp {
    async fn new() -> Self {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let sessions = SessionConfig {
            secret: "test-secret".into(),
            ttl_seconds: 600,
        };
        let api = ApiContext {
            storage: storage.clone(),
            workstudio: Arc::new(InMemoryWorkStudio::demo()),
            sessions: sessions.clone(),
        };
        let app = build_router(Arc::new(AppState { api }));
        Self {
            app,
            storage,
            sessions,
        }
    }

    async fn user(&self, username: &str, roles: &[Role], onboarded: bool) -> (UserId, String) {
        let user_id = self
            .storage
            .create_user(username, &hash_password("password1").expect("hash"))
            .await
            .expect("user");
        for role in roles {
            self.storage.assign_role(user_id, *role).await.expect("role");
        }
        if onboarded {
            self.storage
                .complete_onboarding(user_id, Utc::now())
                .await
                .expect("onboard");
        }
        let (token, _) = mint_session_token(&self.sessions, user_id).expect("token");
        (user_id, token)
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.expect("response")
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        let mut builder = Request::get(uri);
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        self.send(builder.body(Body::empty()).expect("request")).await
    }

    async fn post_json(&self, uri: &str, token: Option<&str>, json: serde_json::Value) -> Response {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::COOKIE, format!("session={token}"));
        }
        self.send(builder.body(Body::from(json.to_string())).expect("request"))
            .await
    }
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

async fn seed_regions(storage: &Storage) {
    let week = NaiveDate::from_ymd_opt(2026, 10, 10).expect("date");
    for (name, order, planned, total) in [
        ("Central", 1, 30.0, 100.0),
        ("Coastal", 2, 80.0, 100.0),
        ("Mountain", 3, 10.0, 50.0),
    ] {
        let region_id = storage.create_region(name, order).await.expect("region");
        storage
            .upsert_weekly_aggregate(&RegionalWeeklyAggregate {
                region_id,
                week_ending: week,
                active_circuits: 3,
                total_circuits: 5,
                active_planners: 2,
                miles_planned: planned,
                miles_remaining: total - planned,
                total_miles: total,
                percent_complete: planned / total * 100.0,
            })
            .await
            .expect("aggregate");
    }
}

#[tokio::test]
async fn healthz_is_public() {
    let test = TestApp::new().await;
    let response = test.get("/healthz", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes.as_ref(), b"ok");
}

#[tokio::test]
async fn anonymous_requests_are_sent_to_login() {
    let test = TestApp::new().await;
    for uri in ["/dashboard", "/assessments/overview", "/admin/users", "/onboarding"] {
        let response = test.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), "/login", "{uri}");
    }

    let response = test.get("/login", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn invalid_session_is_treated_as_anonymous() {
    let test = TestApp::new().await;
    let response = test.get("/dashboard", Some("not-a-token")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn login_sets_session_cookie_and_reports_next_step() {
    let test = TestApp::new().await;
    test.user("planner", &[Role::Planner], true).await;

    let response = test
        .post_json(
            "/login",
            None,
            serde_json::json!({ "username": "planner", "password": "password1" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("set-cookie")
        .to_string();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let login: LoginResponse = json_body(response).await;
    assert_eq!(login.redirect_to, "/dashboard");

    let response = test.get("/dashboard", Some(&login.token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/assessments/overview");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let test = TestApp::new().await;
    test.user("planner", &[], true).await;
    let response = test
        .post_json(
            "/login",
            None,
            serde_json::json!({ "username": "planner", "password": "nope" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn onboarding_gate_holds_until_completed() {
    let test = TestApp::new().await;
    let (_, token) = test.user("newbie", &[Role::User], false).await;

    let response = test.get("/assessments/overview", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/onboarding");

    let response = test.get("/admin/users", Some(&token)).await;
    assert_eq!(location(&response), "/onboarding");

    let response = test.get("/onboarding", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let status: OnboardingStatus = json_body(response).await;
    assert!(!status.completed);

    let response = test
        .post_json(
            "/onboarding",
            Some(&token),
            serde_json::json!({ "password": "brand-new-pass", "password_confirmation": "brand-new-pass" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let response = test.get("/assessments/overview", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = test.get("/onboarding", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn onboarding_rejects_mismatched_passwords() {
    let test = TestApp::new().await;
    let (_, token) = test.user("newbie", &[], false).await;
    let response = test
        .post_json(
            "/onboarding",
            Some(&token),
            serde_json::json!({ "password": "brand-new-pass", "password_confirmation": "other-pass" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn onboarded_users_are_bounced_from_guest_routes() {
    let test = TestApp::new().await;
    let (_, token) = test.user("planner", &[], true).await;
    let response = test.get("/login", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");
}

#[tokio::test]
async fn admin_routes_forbid_non_admins() {
    let test = TestApp::new().await;
    let (_, token) = test.user("planner", &[Role::Planner, Role::GeneralForeman], true).await;

    let response = test.get("/admin/users", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.message, "This action is unauthorized.");

    let response = test.get("/admin/workstudio/health", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admins_manage_roles_over_http() {
    let test = TestApp::new().await;
    let (_, admin_token) = test.user("admin", &[Role::Admin], true).await;
    let (planner_id, _) = test.user("planner", &[], true).await;

    let response = test.get("/admin/users", Some(&admin_token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let users: Vec<UserSummary> = json_body(response).await;
    assert_eq!(users.len(), 2);

    let response = test
        .post_json(
            &format!("/admin/users/{}/roles", planner_id.0),
            Some(&admin_token),
            serde_json::json!({ "role": "planner" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary: UserSummary = json_body(response).await;
    assert_eq!(summary.roles, vec![Role::Planner]);

    let request = Request::delete(format!("/admin/users/{}/roles/planner", planner_id.0))
        .header(header::COOKIE, format!("session={admin_token}"))
        .body(Body::empty())
        .expect("request");
    let response = test.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary: UserSummary = json_body(response).await;
    assert!(summary.roles.is_empty());

    let response = test
        .post_json(
            &format!("/admin/users/{}/roles", planner_id.0),
            Some(&admin_token),
            serde_json::json!({ "role": "sudo_admin" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bearer_header_authenticates_like_the_cookie() {
    let test = TestApp::new().await;
    let (_, token) = test.user("planner", &[], true).await;
    let request = Request::get("/statuses")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request");
    let response = test.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let statuses: Vec<StatusDescriptor> = json_body(response).await;
    assert_eq!(statuses.len(), 4);
    assert!(!statuses[3].syncs_automatically);
}

#[tokio::test]
async fn overview_honours_sort_and_search_from_the_url() {
    let test = TestApp::new().await;
    seed_regions(&test.storage).await;
    let (_, token) = test.user("planner", &[], true).await;

    let response = test
        .get(
            "/assessments/overview?view=table&sort=miles_planned&dir=desc",
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let view: DashboardView = json_body(response).await;
    let names: Vec<&str> = view.regions.iter().map(|r| r.region.name.as_str()).collect();
    assert_eq!(names, vec!["Coastal", "Central", "Mountain"]);
    assert!(!view.panel_open);
    assert_eq!(view.totals.regions, 3);

    let response = test
        .get("/assessments/overview?search=moun", Some(&token))
        .await;
    let view: DashboardView = json_body(response).await;
    assert_eq!(view.regions.len(), 1);
    assert_eq!(view.regions[0].region.name, "Mountain");
}

#[tokio::test]
async fn overview_opens_panel_for_selected_region() {
    let test = TestApp::new().await;
    seed_regions(&test.storage).await;
    let (_, token) = test.user("planner", &[], true).await;
    let central = test
        .storage
        .find_region_by_name("Central")
        .await
        .expect("lookup")
        .expect("region");

    let response = test
        .get(
            &format!("/assessments/overview?region={}", central.region_id.0),
            Some(&token),
        )
        .await;
    let view: DashboardView = json_body(response).await;
    assert!(view.panel_open);
    assert_eq!(view.selected_region_id, Some(central.region_id));
    assert_eq!(view.history.len(), 1);
}

#[tokio::test]
async fn malformed_region_leaves_the_panel_closed() {
    let test = TestApp::new().await;
    seed_regions(&test.storage).await;
    let (_, token) = test.user("planner", &[], true).await;

    for uri in [
        "/assessments/overview?region=abc",
        "/assessments/overview?region=",
        "/assessments/overview?sort=bogus&dir=sideways&region=9999999999999999999999",
    ] {
        let response = test.get(uri, Some(&token)).await;
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let view: DashboardView = json_body(response).await;
        assert!(!view.panel_open, "{uri}");
        assert_eq!(view.selected_region_id, None, "{uri}");
        assert_eq!(view.regions.len(), 3, "{uri}");
    }
}

#[tokio::test]
async fn sort_header_click_toggles_direction_in_redirect() {
    let test = TestApp::new().await;
    let (_, token) = test.user("planner", &[], true).await;

    let response = test
        .get(
            "/assessments/overview/sort/miles_planned?view=cards&sort=miles_planned&dir=asc",
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "/assessments/overview?view=cards&sort=miles_planned&dir=desc"
    );

    let response = test
        .get(
            "/assessments/overview/sort/total_miles?view=table&sort=miles_planned&dir=desc",
            Some(&token),
        )
        .await;
    assert_eq!(
        location(&response),
        "/assessments/overview?view=table&sort=total_miles&dir=asc"
    );

    let response = test
        .get("/assessments/overview/sort/color", Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn circuits_and_planned_units_come_from_workstudio() {
    let test = TestApp::new().await;
    let (_, token) = test.user("planner", &[Role::Planner], true).await;

    let response = test.get("/circuits?status=ACTIV", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let circuits: Vec<Circuit> = json_body(response).await;
    assert_eq!(circuits.len(), 1);

    let response = test.get("/circuits?status=NOPE", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = test
        .get("/work-orders/2026-0101/planned-units", Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let units: Vec<PlannedUnit> = json_body(response).await;
    assert_eq!(units.len(), 1);

    let response = test
        .get("/work-orders/1999-0000/planned-units", Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_workstudio_diagnostics() {
    let test = TestApp::new().await;
    let (_, token) = test.user("root", &[Role::SudoAdmin], true).await;

    let response = test.get("/admin/workstudio/health", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthReport = json_body(response).await;
    assert!(health.healthy);

    let response = test.get("/admin/workstudio/credentials", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = test
        .post_json(
            "/admin/workstudio/views/unknown-view",
            Some(&token),
            serde_json::json!({ "name": "status", "value": "QC" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logout_clears_the_session_cookie() {
    let test = TestApp::new().await;
    let (_, token) = test.user("planner", &[], true).await;
    let request = Request::post("/logout")
        .header(header::COOKIE, format!("session={token}"))
        .body(Body::empty())
        .expect("request");
    let response = test.send(request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .expect("set-cookie");
    assert!(cookie.contains("Max-Age=0"));
}

#[test]
fn session_token_prefers_cookie_over_bearer() {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(header::COOKIE, "theme=dark; session=abc".parse().expect("header"));
    headers.insert(header::AUTHORIZATION, "Bearer xyz".parse().expect("header"));
    assert_eq!(gate::session_token(&headers).as_deref(), Some("abc"));

    headers.remove(header::COOKIE);
    assert_eq!(gate::session_token(&headers).as_deref(), Some("xyz"));

    headers.remove(header::AUTHORIZATION);
    assert_eq!(gate::session_token(&headers), None);
}
