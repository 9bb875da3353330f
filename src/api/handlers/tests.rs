use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        HeaderMap, Method, Request, StatusCode,
    },
    Router,
};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::Mutex;
use tower::ServiceExt;
use url::Url;

use crate::{
    api::router,
    auth::{
        config::DEFAULT_SESSION_TTL_SECONDS,
        error::{ErrorKind, Result},
        mailer::Mailer,
        oauth2::{ExternalUser, Provider, ProviderRegistry, ProviderSession},
        store::memory::MemoryStore,
        AuthConfig, AuthState,
    },
};

#[derive(Default)]
struct FakeGitHub {
    calls: AtomicUsize,
}

#[async_trait]
impl Provider for FakeGitHub {
    fn name(&self) -> &str {
        "github"
    }

    fn begin_auth(&self, state: &str) -> Result<ProviderSession> {
        Ok(ProviderSession {
            auth_url: format!("https://github.test/login/oauth/authorize?state={state}"),
            state: state.to_string(),
            pkce_verifier: Some("verifier".into()),
        })
    }

    async fn authorize(&self, _: &ProviderSession, code: &str) -> Result<ExternalUser> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if code == "boom" {
            return Err(ErrorKind::InternalIssue.hint("token endpoint unreachable"));
        }
        Ok(ExternalUser {
            provider: "github".into(),
            user_id: "123".into(),
            email: Some("octo@example.com".into()),
            name: Some("Octo Cat".into()),
            access_token: "gho_token".into(),
            ..ExternalUser::default()
        })
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_verification(&self, to: &str, link: &str) -> anyhow::Result<()> {
        self.sent.lock().await.push((to.to_string(), link.to_string()));
        Ok(())
    }
}

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    github: Arc<FakeGitHub>,
    mailer: Arc<RecordingMailer>,
}

fn harness() -> Harness {
    let config = AuthConfig::new(
        "http://localhost:8080".into(),
        SecretString::from("test-signing-secret".to_string()),
    )
    .sanitise()
    .expect("config");
    let store = Arc::new(MemoryStore::default());
    let github = Arc::new(FakeGitHub::default());
    let mailer = Arc::new(RecordingMailer::default());
    let state = AuthState::new(
        config,
        store.clone(),
        ProviderRegistry::new().with_provider(github.clone()),
        mailer.clone(),
    );
    Harness {
        app: router(Arc::new(state)),
        store,
        github,
        mailer,
    }
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    fn cookie(&self, name: &str) -> Option<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find(|value| value.starts_with(&format!("{name}=")))
            .map(str::to_string)
    }

    /// `name=value` pair ready for a `Cookie` header.
    fn cookie_pair(&self, name: &str) -> String {
        self.cookie(name)
            .and_then(|cookie| cookie.split(';').next().map(str::to_string))
            .unwrap_or_default()
    }

    fn location(&self) -> &str {
        self.headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }
}

async fn send(app: &Router, request: Request<Body>) -> Reply {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    Reply {
        status,
        headers,
        body,
    }
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).expect("request")
}

fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .or_else(|_| Url::parse("http://localhost").and_then(|base| base.join(url)))
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

#[tokio::test]
async fn register_login_me_logout() {
    let h = harness();
    let credentials = json!({"kind": "standard", "username": "bob", "password": "p@ss"});

    let registered = send(&h.app, post_json("/register", &credentials)).await;
    assert_eq!(registered.status, StatusCode::CREATED);
    let id = registered.body["id"].as_str().unwrap_or_default().to_string();
    assert!(!id.is_empty());
    assert!(registered.body.get("password_hash").is_none());
    assert_eq!(registered.body["username"], "bob");

    let logged_in = send(&h.app, post_json("/login", &credentials)).await;
    assert_eq!(logged_in.status, StatusCode::OK);
    assert_eq!(logged_in.body["user"]["id"], id.as_str());
    assert!(logged_in.body["token"].as_str().is_some_and(|t| !t.is_empty()));
    let expiry: DateTime<Utc> =
        serde_json::from_value(logged_in.body["expiry"].clone()).expect("expiry");
    let remaining = (expiry - Utc::now()).num_seconds();
    assert!((DEFAULT_SESSION_TTL_SECONDS - 5..=DEFAULT_SESSION_TTL_SECONDS).contains(&remaining));

    let session_cookie = logged_in.cookie("_idgate_auth").unwrap_or_default();
    assert!(session_cookie.contains("HttpOnly"));
    assert!(session_cookie.contains("SameSite=Lax"));
    assert!(session_cookie.contains("Path=/"));

    let pair = logged_in.cookie_pair("_idgate_auth");
    let me = send(&h.app, get("/me", Some(&pair))).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["id"], id.as_str());

    let logout = send(&h.app, get("/logout", Some(&pair))).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    assert!(logout
        .cookie("_idgate_auth")
        .is_some_and(|cookie| cookie.contains("Max-Age=0")));

    let cleared = logout.cookie_pair("_idgate_auth");
    let me = send(&h.app, get("/me", Some(&cleared))).await;
    assert_eq!(me.status, StatusCode::UNAUTHORIZED);
    assert_eq!(me.code(), "missing_auth");
}

#[tokio::test]
async fn me_accepts_bearer_token() {
    let h = harness();
    let credentials = json!({"username": "carol", "password": "secret"});
    send(&h.app, post_json("/register", &credentials)).await;
    let logged_in = send(&h.app, post_json("/login", &credentials)).await;
    let token = logged_in.body["token"].as_str().unwrap_or_default();

    let request = Request::builder()
        .uri("/me")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request");
    let me = send(&h.app, request).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["username"], "carol");

    let forged = Request::builder()
        .uri("/me")
        .header(AUTHORIZATION, format!("Bearer {token}x"))
        .body(Body::empty())
        .expect("request");
    assert_eq!(send(&h.app, forged).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let h = harness();
    let first = json!({"username": "alice", "email": "alice@example.com", "password": "pw"});
    let second = json!({"username": "alice2", "email": "Alice@Example.com", "password": "pw"});

    assert_eq!(send(&h.app, post_json("/register", &first)).await.status, StatusCode::CREATED);
    let conflict = send(&h.app, post_json("/register", &second)).await;
    assert_eq!(conflict.status, StatusCode::CONFLICT);
    assert_eq!(conflict.body["attribs"]["key"], "email:alice@example.com");
    assert_eq!(h.store.user_count().await, 1);
}

#[tokio::test]
async fn register_validates_input() {
    let h = harness();
    let cases = [
        (json!({"username": "bob"}), "password_required"),
        (json!({"password": "pw"}), "invalid_input"),
        (json!({"email": "not-an-email", "password": "pw"}), "invalid_email"),
        (json!({"kind": "admin", "username": "bob", "password": "pw"}), "invalid_kind"),
    ];
    for (body, code) in cases {
        let reply = send(&h.app, post_json("/register", &body)).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(reply.code(), code, "{body}");
    }
    assert_eq!(h.store.user_count().await, 0);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let h = harness();
    send(
        &h.app,
        post_json(
            "/register",
            &json!({"username": "bob", "email": "bob@example.com", "password": "p@ss"}),
        ),
    )
    .await;

    let mut messages = Vec::new();
    for body in [
        json!({"username": "bob", "password": "wrong"}),
        json!({"username": "nobody", "password": "p@ss"}),
        json!({"kind": "admin", "username": "bob", "password": "p@ss"}),
        json!({"email": "nobody@example.com", "password": "p@ss"}),
    ] {
        let reply = send(&h.app, post_json("/login", &body)).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED, "{body}");
        assert_eq!(reply.code(), "missing_auth");
        assert!(reply.cookie("_idgate_auth").is_none());
        messages.push(reply.body["message"].clone());
    }
    messages.dedup();
    assert_eq!(messages.len(), 1);

    let by_email = send(
        &h.app,
        post_json("/login", &json!({"email": " BOB@example.com ", "password": "p@ss"})),
    )
    .await;
    assert_eq!(by_email.status, StatusCode::OK);
}

#[tokio::test]
async fn form_login_redirects_with_error_code() {
    let h = harness();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=ghost&password=x&redirect_to=%2Fsignin%3Fnext%3D%252Fapp"))
        .expect("request");
    let reply = send(&h.app, request).await;
    assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(reply.location(), "/signin?next=%2Fapp&err_code=missing_auth");
    assert_eq!(reply.body, Value::Null);
}

#[tokio::test]
async fn successful_login_redirects_with_cookie() {
    let h = harness();
    let credentials = json!({"username": "dave", "password": "pw"});
    send(&h.app, post_json("/register", &credentials)).await;

    let reply = send(&h.app, post_json("/login?redirect_to=%2Fdashboard", &credentials)).await;
    assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(reply.location(), "/dashboard");
    assert!(reply.cookie("_idgate_auth").is_some());
}

#[tokio::test]
async fn email_verification_logs_in_once() {
    let h = harness();
    let registered = send(
        &h.app,
        post_json("/register", &json!({"email": "erin@example.com", "password": "pw"})),
    )
    .await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert!(registered.body.get("verified_at").is_none());

    let (to, link) = h.mailer.sent.lock().await.first().cloned().unwrap_or_default();
    assert_eq!(to, "erin@example.com");
    assert!(link.starts_with("http://localhost:8080/verify?"));

    let id = query_param(&link, "id").unwrap_or_default();
    let token = query_param(&link, "token").unwrap_or_default();
    let uri = format!("/verify?id={id}&token={token}");

    let verified = send(&h.app, get(&uri, None)).await;
    assert_eq!(verified.status, StatusCode::OK);
    assert_eq!(verified.body["user"]["id"], id.as_str());
    assert!(verified.body["user"]["verified_at"].is_string());
    assert!(verified.cookie("_idgate_auth").is_some());

    let replay = send(&h.app, get(&uri, None)).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);

    let garbage = send(&h.app, get("/verify?id=nope&token=x", None)).await;
    assert_eq!(garbage.code(), "missing_auth");
}

async fn start_oauth2(h: &Harness, query: &str) -> (String, String) {
    let reply = send(&h.app, get(&format!("/oauth2?{query}"), None)).await;
    assert_eq!(reply.status, StatusCode::TEMPORARY_REDIRECT);
    let flow_cookie = reply.cookie("_idgate_oauth2").unwrap_or_default();
    assert!(flow_cookie.contains("Path=/oauth2"));
    assert!(flow_cookie.contains("HttpOnly"));
    let state = query_param(reply.location(), "state").unwrap_or_default();
    (reply.cookie_pair("_idgate_oauth2"), state)
}

#[tokio::test]
async fn oauth2_first_and_returning_login() {
    let h = harness();

    let mut ids = Vec::new();
    for _ in 0..2 {
        let (cookie, state) = start_oauth2(&h, "p=github").await;
        let reply = send(
            &h.app,
            get(&format!("/oauth2/cb?state={state}&code=abc"), Some(&cookie)),
        )
        .await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body["token"].is_string());
        assert!(reply.cookie("_idgate_auth").is_some());
        assert!(reply
            .cookie("_idgate_oauth2")
            .is_some_and(|cookie| cookie.contains("Max-Age=0")));
        ids.push(reply.body["user"]["id"].as_str().unwrap_or_default().to_string());
    }

    assert_eq!(ids[0], ids[1]);
    assert_eq!(h.store.user_count().await, 1);
    assert_eq!(h.github.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn oauth2_state_mismatch_is_rejected_before_provider_call() {
    let h = harness();
    let (cookie, _) = start_oauth2(&h, "p=github").await;

    let reply = send(
        &h.app,
        get("/oauth2/cb?state=attacker&code=stolen", Some(&cookie)),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.code(), "invalid_callback");
    assert_eq!(h.github.calls.load(Ordering::SeqCst), 0);
    assert!(reply
        .cookie("_idgate_oauth2")
        .is_some_and(|cookie| cookie.contains("Max-Age=0")));
}

#[tokio::test]
async fn oauth2_callback_without_flow_cookie() {
    let h = harness();
    let reply = send(&h.app, get("/oauth2/cb?state=s&code=c", None)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.code(), "invalid_callback");
}

#[tokio::test]
async fn oauth2_begin_errors_follow_redirect_strategy() {
    let h = harness();

    let json_reply = send(&h.app, get("/oauth2?p=gitlab", None)).await;
    assert_eq!(json_reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(json_reply.code(), "invalid_provider");

    let redirected = send(&h.app, get("/oauth2?p=github&kind=admin&redirect_to=%2Flogin", None)).await;
    assert_eq!(redirected.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(redirected.location(), "/login?err_code=invalid_kind");
    assert!(redirected.cookie("_idgate_oauth2").is_none());
}

#[tokio::test]
async fn oauth2_redirect_target_survives_the_round_trip() {
    let h = harness();
    let (cookie, state) = start_oauth2(&h, "p=github&redirect_to=%2Fwelcome").await;

    let ok = send(
        &h.app,
        get(&format!("/oauth2/cb?state={state}&code=abc"), Some(&cookie)),
    )
    .await;
    assert_eq!(ok.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(ok.location(), "/welcome");
    assert!(ok.cookie("_idgate_auth").is_some());

    let (cookie, state) = start_oauth2(&h, "p=github&redirect_to=%2Fwelcome").await;
    let failed = send(
        &h.app,
        get(&format!("/oauth2/cb?state={state}&code=boom"), Some(&cookie)),
    )
    .await;
    assert_eq!(failed.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(failed.location(), "/welcome?err_code=internal_issue");
}

#[tokio::test]
async fn oauth2_lost_registration_race_is_conflict() {
    let h = harness();
    let (cookie, state) = start_oauth2(&h, "p=github").await;
    let first = send(
        &h.app,
        get(&format!("/oauth2/cb?state={state}&code=abc"), Some(&cookie)),
    )
    .await;
    assert_eq!(first.status, StatusCode::OK);

    // The lookup misses but the key is already taken.
    h.store.set_stale_reads(true);

    let (cookie, state) = start_oauth2(&h, "p=github").await;
    let json_reply = send(
        &h.app,
        get(&format!("/oauth2/cb?state={state}&code=abc"), Some(&cookie)),
    )
    .await;
    assert_eq!(json_reply.status, StatusCode::CONFLICT);
    assert_eq!(json_reply.code(), "conflict");
    assert!(json_reply.cookie("_idgate_auth").is_none());

    let (cookie, state) = start_oauth2(&h, "p=github&redirect_to=%2Fwelcome").await;
    let redirected = send(
        &h.app,
        get(&format!("/oauth2/cb?state={state}&code=abc"), Some(&cookie)),
    )
    .await;
    assert_eq!(redirected.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(redirected.location(), "/welcome?err_code=conflict");
    assert_eq!(h.store.user_count().await, 1);
}

#[tokio::test]
async fn health_reports_store_state() {
    let h = harness();
    let ok = send(&h.app, get("/health", None)).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["database"], "ok");
    assert_eq!(ok.body["name"], "idgate");
    assert!(ok.headers.get("X-App").is_some());

    h.store.set_offline(true);
    let down = send(&h.app, get("/health", None)).await;
    assert_eq!(down.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(down.body["database"], "error");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let h = harness();
    let reply = send(&h.app, get("/openapi.json", None)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["paths"]["/oauth2/cb"].is_object());
}
