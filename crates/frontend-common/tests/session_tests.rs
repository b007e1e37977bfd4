//! Session and request pipeline against a mocked backend

use mockall::mock;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use ubm_core::RefreshFailurePolicy;
use ubm_frontend_common::{
    MemoryNavigator, MemoryTokenStore, NavigationEvent, Navigator, Session, TokenStore,
};
use ubm_http::client::auth::{LOGIN_PATH, ME_PATH, PASSWORD_PATH, REFRESH_PATH};
use ubm_http::types::LoginRequest;
use ubm_http::{ApiClient, ClientError};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate, Times};

mock! {
    pub Nav {}

    impl Navigator for Nav {
        fn push(&self, path: &str);
        fn redirect(&self, url: &str);
    }
}

fn tokens(access: &str, refresh: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "token_type": "bearer"
    })
}

fn admin_profile() -> Value {
    json!({
        "id": 1,
        "username": "admin",
        "email": "admin@example.com",
        "is_active": true,
        "is_admin": true
    })
}

struct Harness {
    server: MockServer,
    store: Arc<MemoryTokenStore>,
    navigator: Arc<MemoryNavigator>,
    session: Arc<Session>,
}

async fn harness_with_policy(policy: RefreshFailurePolicy) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::new());
    let navigator = Arc::new(MemoryNavigator::new());
    let session = Session::builder()
        .client(ApiClient::new(server.uri()).unwrap())
        .store(store.clone())
        .navigator(navigator.clone())
        .refresh_failure_policy(policy)
        .build()
        .unwrap();

    Harness {
        server,
        store,
        navigator,
        session,
    }
}

async fn harness() -> Harness {
    harness_with_policy(RefreshFailurePolicy::default()).await
}

async fn mount_login(server: &MockServer, access: &str, refresh: &str) {
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens(access, refresh)))
        .mount(server)
        .await;
}

async fn mount_profile(server: &MockServer, access: &str, expected_calls: impl Into<Times>) {
    Mock::given(method("GET"))
        .and(path(ME_PATH))
        .and(header("authorization", format!("Bearer {access}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(admin_profile()))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn logged_in(h: &Harness) {
    mount_login(&h.server, "A1", "R1").await;
    mount_profile(&h.server, "A1", 1..).await;
    assert!(h.session.login(&LoginRequest::new("admin", "secret")).await);
}

#[tokio::test]
async fn test_login_fetches_profile_and_persists_tokens() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .and(body_json(json!({"username": "admin", "password": "secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("A1", "R1")))
        .expect(1)
        .mount(&h.server)
        .await;
    mount_profile(&h.server, "A1", 1).await;

    let ok = h.session.login(&LoginRequest::new("admin", "secret")).await;

    assert!(ok);
    assert!(h.session.is_authenticated());
    assert!(h.session.is_admin());
    assert_eq!(h.session.user().unwrap().username, "admin");
    assert_eq!(h.session.last_error(), None);
    assert_eq!(h.store.get("accessToken").as_deref(), Some("A1"));
    assert_eq!(h.store.get("refreshToken").as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_login_with_unloadable_profile_ends_session() {
    let h = harness().await;
    mount_login(&h.server, "A1", "R1").await;
    Mock::given(method("GET"))
        .and(path(ME_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;

    let ok = h.session.login(&LoginRequest::new("admin", "secret")).await;

    assert!(ok);
    assert!(!h.session.is_authenticated());
    assert_eq!(h.session.user(), None);
    assert_eq!(h.store.get("accessToken"), None);
    assert_eq!(h.navigator.current().as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_loading_flag_spans_login() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(tokens("A1", "R1"))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;
    mount_profile(&h.server, "A1", 1).await;

    let req = LoginRequest::new("admin", "secret");
    let (ok, loading_midway) = tokio::join!(
        h.session.login(&req),
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.session.is_loading()
        }
    );

    assert!(ok);
    assert!(loading_midway);
    assert!(!h.session.is_loading());
}

#[tokio::test]
async fn test_login_failure_reports_server_detail() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Incorrect username or password"})),
        )
        .mount(&h.server)
        .await;

    let ok = h.session.login(&LoginRequest::new("admin", "wrong")).await;

    assert!(!ok);
    assert!(!h.session.is_authenticated());
    assert!(!h.session.is_loading());
    assert_eq!(
        h.session.last_error().as_deref(),
        Some("Incorrect username or password")
    );
    assert_eq!(h.store.get("accessToken"), None);
}

#[tokio::test]
async fn test_login_failure_without_detail_uses_generic_message() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    assert!(!h.session.login(&LoginRequest::new("admin", "secret")).await);
    assert_eq!(h.session.last_error().as_deref(), Some("Login failed"));
}

#[tokio::test]
async fn test_login_clears_previous_error() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    assert!(!h.session.login(&LoginRequest::new("admin", "secret")).await);
    assert!(h.session.last_error().is_some());

    logged_in(&h).await;
    assert_eq!(h.session.last_error(), None);
}

#[tokio::test]
async fn test_check_auth_without_token_makes_no_requests() {
    let h = harness().await;

    h.session.check_auth().await;

    assert!(!h.session.is_authenticated());
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_check_auth_restores_valid_session() {
    let h = harness().await;
    h.store.set("accessToken", "A1");
    h.store.set("refreshToken", "R1");

    mount_profile(&h.server, "A1", 1).await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("A2", "R2")))
        .expect(0)
        .mount(&h.server)
        .await;

    h.session.check_auth().await;

    assert!(h.session.is_authenticated());
    assert_eq!(h.session.credentials().access_token.as_deref(), Some("A1"));
}

#[tokio::test]
async fn test_check_auth_with_expired_token_refreshes_once() {
    let h = harness().await;
    h.store.set("accessToken", "A0");
    h.store.set("refreshToken", "R0");

    Mock::given(method("GET"))
        .and(path(ME_PATH))
        .and(header("authorization", "Bearer A0"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(body_json(json!({"refresh_token": "R0"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("A2", "R2")))
        .expect(1)
        .mount(&h.server)
        .await;
    mount_profile(&h.server, "A2", 1).await;

    h.session.check_auth().await;

    assert!(h.session.is_authenticated());
    assert_eq!(h.store.get("accessToken").as_deref(), Some("A2"));
    assert_eq!(h.store.get("refreshToken").as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_check_auth_with_rejected_refresh_logs_out() {
    let h = harness().await;
    h.store.set("accessToken", "A0");
    h.store.set("refreshToken", "R0");

    Mock::given(method("GET"))
        .and(path(ME_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid refresh token"})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    h.session.check_auth().await;

    assert!(!h.session.is_authenticated());
    assert_eq!(h.store.get("accessToken"), None);
    assert_eq!(h.store.get("refreshToken"), None);
    assert_eq!(h.navigator.current().as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_check_auth_refreshes_once_when_refresh_is_unavailable() {
    let h = harness_with_policy(RefreshFailurePolicy::KeepSessionOnTransient).await;
    h.store.set("accessToken", "A0");
    h.store.set("refreshToken", "R0");

    Mock::given(method("GET"))
        .and(path(ME_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&h.server)
        .await;

    h.session.check_auth().await;

    assert!(!h.session.is_authenticated());
    assert_eq!(h.session.pipeline().refresh_attempts(), 1);
    assert_eq!(h.store.get("accessToken").as_deref(), Some("A0"));
    assert_eq!(h.store.get("refreshToken").as_deref(), Some("R0"));
}

#[tokio::test]
async fn test_check_auth_refreshes_after_server_error() {
    let h = harness().await;
    h.store.set("accessToken", "A0");
    h.store.set("refreshToken", "R0");

    Mock::given(method("GET"))
        .and(path(ME_PATH))
        .and(header("authorization", "Bearer A0"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("A2", "R2")))
        .expect(1)
        .mount(&h.server)
        .await;
    mount_profile(&h.server, "A2", 1).await;

    h.session.check_auth().await;

    assert!(h.session.is_authenticated());
    assert_eq!(h.store.get("accessToken").as_deref(), Some("A2"));
}

#[tokio::test]
async fn test_forced_logout_hides_profile() {
    let h = harness().await;
    logged_in(&h).await;
    assert!(h.session.is_admin());

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    let _ = h.session.pipeline().get::<Value>("/api/devices").await;

    assert_eq!(h.session.user(), None);
    assert!(!h.session.is_admin());
    assert_eq!(
        h.navigator.last(),
        Some(NavigationEvent::Redirect("/login".into()))
    );
}

#[tokio::test]
async fn test_unauthorized_request_is_refreshed_and_replayed() {
    let h = harness().await;
    logged_in(&h).await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .and(body_json(json!({"refresh_token": "R1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("A2", "R2")))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&h.server)
        .await;

    let devices: Value = h.session.pipeline().get("/api/devices").await.unwrap();

    assert_eq!(devices, json!([{"id": 1}]));
    assert_eq!(h.store.get("accessToken").as_deref(), Some("A2"));
    assert_eq!(h.store.get("refreshToken").as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_replayed_unauthorized_is_not_refreshed_again() {
    let h = harness().await;
    logged_in(&h).await;

    Mock::given(method("GET"))
        .and(path("/api/backups"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("A2", "R2")))
        .expect(1)
        .mount(&h.server)
        .await;

    let result: Result<Value, _> = h.session.pipeline().get("/api/backups").await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    assert_eq!(h.session.credentials().access_token.as_deref(), Some("A2"));
}

#[tokio::test]
async fn test_non_auth_errors_pass_through_untouched() {
    let h = harness().await;
    logged_in(&h).await;

    Mock::given(method("GET"))
        .and(path("/api/schedules"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Not found"})))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(tokens("A2", "R2")))
        .expect(0)
        .mount(&h.server)
        .await;

    let result: Result<Value, _> = h.session.pipeline().get("/api/schedules").await;

    assert!(matches!(result, Err(ClientError::NotFound(_))));
    assert!(h.session.is_authenticated());
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_refresh() {
    let h = harness().await;
    logged_in(&h).await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(tokens("A2", "R2"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(3)
        .mount(&h.server)
        .await;

    let pipeline = h.session.pipeline();
    let (a, b, c) = tokio::join!(
        pipeline.get::<Value>("/api/devices"),
        pipeline.get::<Value>("/api/devices"),
        pipeline.get::<Value>("/api/devices"),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert!(c.is_ok());
    assert_eq!(pipeline.refresh_attempts(), 1);
    assert_eq!(h.store.get("accessToken").as_deref(), Some("A2"));
}

#[tokio::test]
async fn test_refresh_failure_clears_tokens_and_redirects() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryTokenStore::new());

    let mut navigator = MockNav::new();
    navigator
        .expect_redirect()
        .withf(|url| url == "/login")
        .times(1)
        .return_const(());
    navigator.expect_push().times(0);

    let session = Session::builder()
        .client(ApiClient::new(server.uri()).unwrap())
        .store(store.clone())
        .navigator(Arc::new(navigator))
        .build()
        .unwrap();

    mount_login(&server, "A1", "R1").await;
    mount_profile(&server, "A1", 1).await;
    assert!(session.login(&LoginRequest::new("admin", "secret")).await);

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid refresh token"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result: Result<Value, _> = session.pipeline().get("/api/devices").await;

    assert!(matches!(result, Err(ClientError::AuthenticationFailed(_))));
    assert!(!session.is_authenticated());
    assert_eq!(session.user(), None);
    assert!(!session.is_admin());
    assert_eq!(store.get("accessToken"), None);
    assert_eq!(store.get("refreshToken"), None);
}

#[tokio::test]
async fn test_transient_refresh_failure_can_keep_session() {
    let h = harness_with_policy(RefreshFailurePolicy::KeepSessionOnTransient).await;
    logged_in(&h).await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&h.server)
        .await;

    let result: Result<Value, _> = h.session.pipeline().get("/api/devices").await;

    assert!(matches!(
        result,
        Err(ClientError::ServerError { status: 503, .. })
    ));
    assert_eq!(h.store.get("accessToken").as_deref(), Some("A1"));
    assert_eq!(h.store.get("refreshToken").as_deref(), Some("R1"));
    assert!(
        !h.navigator
            .history()
            .iter()
            .any(|event| matches!(event, NavigationEvent::Redirect(_)))
    );
}

#[tokio::test]
async fn test_transient_refresh_failure_logs_out_by_default() {
    let h = harness().await;
    logged_in(&h).await;

    Mock::given(method("GET"))
        .and(path("/api/devices"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let _ = h.session.pipeline().get::<Value>("/api/devices").await;

    assert_eq!(h.store.get("accessToken"), None);
    assert_eq!(
        h.navigator.last(),
        Some(NavigationEvent::Redirect("/login".into()))
    );
}

#[tokio::test]
async fn test_logout_is_idempotent() {
    let h = harness().await;
    logged_in(&h).await;

    h.session.logout();
    h.session.logout();

    assert!(!h.session.is_authenticated());
    assert_eq!(h.session.user(), None);
    assert_eq!(h.store.get("accessToken"), None);
    assert_eq!(h.store.get("refreshToken"), None);
    assert_eq!(h.navigator.current().as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_refresh_without_refresh_token_logs_out() {
    let h = harness().await;

    assert!(!h.session.refresh_access_token().await);
    assert!(h.server.received_requests().await.unwrap().is_empty());
    assert_eq!(h.navigator.current().as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_change_password_success() {
    let h = harness().await;
    logged_in(&h).await;

    Mock::given(method("PUT"))
        .and(path(PASSWORD_PATH))
        .and(header("authorization", "Bearer A1"))
        .and(body_json(json!({
            "current_password": "secret",
            "new_password": "n3w-secret"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Password changed"})))
        .expect(1)
        .mount(&h.server)
        .await;

    let outcome = h.session.change_password("secret", "n3w-secret").await;

    assert!(outcome.success);
    assert_eq!(outcome.error, None);
    assert!(h.session.is_authenticated());
}

#[tokio::test]
async fn test_change_password_reports_detail() {
    let h = harness().await;
    logged_in(&h).await;

    Mock::given(method("PUT"))
        .and(path(PASSWORD_PATH))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"detail": "Current password is incorrect"})),
        )
        .mount(&h.server)
        .await;

    let outcome = h.session.change_password("wrong", "n3w-secret").await;

    assert!(!outcome.success);
    assert_eq!(
        outcome.error.as_deref(),
        Some("Current password is incorrect")
    );
    assert!(h.session.is_authenticated());
}

#[tokio::test]
async fn test_change_password_generic_failure() {
    let h = harness().await;
    logged_in(&h).await;

    Mock::given(method("PUT"))
        .and(path(PASSWORD_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let outcome = h.session.change_password("secret", "n3w-secret").await;

    assert!(!outcome.success);
    assert_eq!(outcome.error.as_deref(), Some("Password change failed"));
}
