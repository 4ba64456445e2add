//! Integration tests for the login, token and logout endpoints.
//!
//! Drives the axum router with in-memory stores and a fake identity provider,
//! checking status codes, cookies, redirects and stored state.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode, header};
use chrono::Duration;
use gatehouse_platform_access::{
    MemorySessionStore, MemoryUserStore, OidcClaims, OidcConfig, Session, SessionId,
    SessionStore, TokenIssuer, UserStore,
};
use gatehouse_server::auth::{AppState, AuthState, IdentityProvider, OidcError, TokenResult};
use gatehouse_server::config::SessionConfig;
use gatehouse_server::router;
use tower::ServiceExt;

const CSRF: &str = "csrf-123";
const ID_TOKEN: &str = "header.payload.signature";
const END_SESSION: &str = "https://idp.example.com/logout";

/// Identity provider that returns whatever claims the test sets.
struct FakeProvider {
    claims: Mutex<OidcClaims>,
    end_session: bool,
}

impl FakeProvider {
    fn new(claims: OidcClaims) -> Self {
        Self {
            claims: Mutex::new(claims),
            end_session: true,
        }
    }

    fn set_claims(&self, claims: OidcClaims) {
        *self.claims.lock().unwrap() = claims;
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self) -> (String, AuthState) {
        (
            format!("https://idp.example.com/authorize?state={CSRF}"),
            AuthState {
                csrf_token: CSRF.to_string(),
                pkce_verifier: "verifier".to_string(),
                nonce: "nonce".to_string(),
            },
        )
    }

    async fn exchange_code(&self, code: &str, state: &AuthState) -> Result<TokenResult, OidcError> {
        assert_eq!(state.pkce_verifier, "verifier");
        match code {
            "bad-signature" => Err(OidcError::TokenValidation("bad signature".to_string())),
            "unreachable" => Err(OidcError::TokenExchange("connection refused".to_string())),
            _ => Ok(TokenResult {
                claims: self.claims.lock().unwrap().clone(),
                id_token: ID_TOKEN.to_string(),
            }),
        }
    }

    fn end_session_url(&self, id_token_hint: Option<&str>) -> Option<String> {
        if !self.end_session {
            return None;
        }
        Some(match id_token_hint {
            Some(hint) => format!("{END_SESSION}?client_id=gatehouse&id_token_hint={hint}"),
            None => format!("{END_SESSION}?client_id=gatehouse"),
        })
    }
}

struct Harness {
    app: Router,
    users: Arc<MemoryUserStore>,
    sessions: Arc<MemorySessionStore>,
    provider: Arc<FakeProvider>,
}

fn claims(groups: &[&str]) -> OidcClaims {
    OidcClaims::new("u1".to_string(), "https://idp.example.com".to_string())
        .with_email(Some("a@x.com".to_string()))
        .with_groups(groups.iter().map(|g| g.to_string()).collect())
}

fn oidc_config() -> gatehouse_platform_access::OidcConfigBuilder {
    OidcConfig::builder(
        "https://idp.example.com".to_string(),
        "gatehouse".to_string(),
        "secret".to_string(),
        "http://localhost:3000/oidc/callback".to_string(),
    )
}

fn harness_with(config: OidcConfig, provider: FakeProvider) -> Harness {
    let users = Arc::new(MemoryUserStore::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let provider = Arc::new(provider);
    let tokens = TokenIssuer::new(&["test-signing-key"], "gatehouse", Duration::hours(1))
        .expect("token issuer");

    let state = Arc::new(AppState::new(
        provider.clone(),
        users.clone(),
        sessions.clone(),
        tokens,
        config,
        SessionConfig {
            duration_minutes: 60,
            secure_cookies: false,
        },
    ));

    Harness {
        app: router(state),
        users,
        sessions,
        provider,
    }
}

fn harness() -> Harness {
    harness_with(oidc_config().build(), FakeProvider::new(claims(&["editors"])))
}

async fn send(h: &Harness, req: Request<Body>) -> Response<Body> {
    h.app.clone().oneshot(req).await.unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Returns the value a response sets for cookie `name`.
fn set_cookie(resp: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find_map(|pair| pair.strip_prefix(&prefix).map(str::to_string))
}

fn location(resp: &Response<Body>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string()
}

async fn json_body(resp: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Starts a login and returns the login state cookie value.
async fn start_login(h: &Harness, next: Option<&str>) -> String {
    let uri = match next {
        Some(next) => format!("/oidc/authenticate?next={next}"),
        None => "/oidc/authenticate".to_string(),
    };
    let resp = send(h, get(&uri, None)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("https://idp.example.com/authorize"));
    set_cookie(&resp, "auth_state").expect("login state cookie")
}

/// Runs a complete login and returns the callback response.
async fn login(h: &Harness, extra_cookie: Option<&str>) -> Response<Body> {
    let login_state = start_login(h, None).await;
    let cookie = match extra_cookie {
        Some(extra) => format!("auth_state={login_state}; {extra}"),
        None => format!("auth_state={login_state}"),
    };
    send(
        h,
        get(
            &format!("/oidc/callback?code=good&state={CSRF}"),
            Some(&cookie),
        ),
    )
    .await
}

async fn login_session(h: &Harness) -> String {
    let resp = login(h, None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    set_cookie(&resp, "session").expect("session cookie")
}

#[tokio::test]
async fn full_login_flow_issues_token_and_profile() {
    let h = harness();

    let login_state = start_login(&h, Some("/dashboard")).await;
    let resp = send(
        &h,
        get(
            &format!("/oidc/callback?code=good&state={CSRF}"),
            Some(&format!("auth_state={login_state}")),
        ),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/dashboard");
    assert_eq!(set_cookie(&resp, "auth_state").as_deref(), Some(""));
    let session = set_cookie(&resp, "session").expect("session cookie");
    assert_eq!(h.sessions.len(), 1);

    let resp = send(&h, post("/api/token", Some(&format!("session={session}")))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["token_type"], "Bearer");
    let access_token = body["access_token"].as_str().unwrap().to_string();

    let req = Request::builder()
        .uri("/api/me")
        .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
        .body(Body::empty())
        .unwrap();
    let resp = send(&h, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let profile = json_body(resp).await;
    assert_eq!(profile["username"], "a@x.com");
    assert_eq!(profile["email"], "a@x.com");
    assert_eq!(profile["is_active"], true);
    assert_eq!(profile["is_staff"], false);
    assert_eq!(profile["groups"], serde_json::json!(["editors"]));
}

#[tokio::test]
async fn callback_with_mismatched_state_creates_no_session() {
    let h = harness();
    let login_state = start_login(&h, None).await;

    let resp = send(
        &h,
        get(
            "/oidc/callback?code=good&state=forged",
            Some(&format!("auth_state={login_state}")),
        ),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(set_cookie(&resp, "session").is_none());
    assert!(h.sessions.is_empty());
    assert!(h.users.is_empty());
}

#[tokio::test]
async fn callback_without_login_state_is_rejected() {
    let h = harness();

    let resp = send(&h, get(&format!("/oidc/callback?code=good&state={CSRF}"), None)).await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn provider_error_parameter_is_rejected() {
    let h = harness();
    let login_state = start_login(&h, None).await;

    let resp = send(
        &h,
        get(
            &format!("/oidc/callback?error=access_denied&state={CSRF}"),
            Some(&format!("auth_state={login_state}")),
        ),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn invalid_id_token_is_unauthorized() {
    let h = harness();
    let login_state = start_login(&h, None).await;

    let resp = send(
        &h,
        get(
            &format!("/oidc/callback?code=bad-signature&state={CSRF}"),
            Some(&format!("auth_state={login_state}")),
        ),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(h.sessions.is_empty());
    assert!(h.users.is_empty());
}

#[tokio::test]
async fn unreachable_provider_is_bad_gateway() {
    let h = harness();
    let login_state = start_login(&h, None).await;

    let resp = send(
        &h,
        get(
            &format!("/oidc/callback?code=unreachable&state={CSRF}"),
            Some(&format!("auth_state={login_state}")),
        ),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn form_post_callback_logs_in() {
    let h = harness();
    let login_state = start_login(&h, None).await;

    let req = Request::builder()
        .method(Method::POST)
        .uri("/oidc/callback")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, format!("auth_state={login_state}"))
        .body(Body::from(format!("code=good&state={CSRF}")))
        .unwrap();
    let resp = send(&h, req).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
    assert_eq!(h.sessions.len(), 1);
}

#[tokio::test]
async fn login_state_cookie_is_sent_on_cross_site_post() {
    let h = harness();

    let resp = send(&h, get("/oidc/authenticate", None)).await;

    let cookie = resp
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("auth_state="))
        .expect("login state cookie")
        .to_string();
    let attributes: Vec<&str> = cookie.split(';').map(str::trim).collect();
    assert!(attributes.contains(&"SameSite=None"));
    assert!(attributes.contains(&"Secure"));
    assert!(attributes.contains(&"HttpOnly"));
}

#[tokio::test]
async fn token_endpoint_rejects_unauthenticated_requests() {
    let h = harness();

    let resp = send(&h, post("/api/token", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(resp).await;
    assert!(body["error"].is_string());

    let resp = send(&h, post("/api/token", Some("session=unknown"))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_session_is_rejected_and_deleted() {
    let h = harness();
    let session_id = login_session(&h).await;
    let user = h.users.find_by_subject("u1").await.unwrap().unwrap();

    // Replace the live session with an already expired one under the same id.
    let id = SessionId::new(session_id.clone());
    h.sessions.delete(&id).await.unwrap();
    h.sessions
        .create(&Session::new(id.clone(), user.id(), Duration::seconds(-1)))
        .await
        .unwrap();

    let resp = send(&h, post("/api/token", Some(&format!("session={session_id}")))).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(h.sessions.find_by_id(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn me_rejects_missing_and_garbage_bearer() {
    let h = harness();

    let resp = send(&h, get("/api/me", None)).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/api/me")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let resp = send(&h, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["error"], "invalid token");
}

#[tokio::test]
async fn anonymous_logout_redirects_to_end_session() {
    let h = harness();

    let resp = send(&h, get("/oidc/logout", None)).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), format!("{END_SESSION}?client_id=gatehouse"));
}

#[tokio::test]
async fn logout_deletes_session_and_sends_id_token_hint() {
    let h = harness();
    let session = login_session(&h).await;
    let cookie = format!("session={session}");

    let resp = send(&h, post("/oidc/logout", Some(&cookie))).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).contains(&format!("id_token_hint={ID_TOKEN}")));
    assert_eq!(set_cookie(&resp, "session").as_deref(), Some(""));
    assert!(h.sessions.is_empty());

    let resp = send(&h, post("/api/token", Some(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_without_end_session_endpoint_uses_post_logout_uri() {
    let config = oidc_config()
        .post_logout_redirect_uri("https://app.example.com/bye".to_string())
        .build();
    let provider = FakeProvider {
        end_session: false,
        ..FakeProvider::new(claims(&[]))
    };
    let h = harness_with(config, provider);

    let resp = send(&h, get("/oidc/logout", None)).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "https://app.example.com/bye");
}

#[tokio::test]
async fn relogin_with_empty_groups_removes_membership() {
    let h = harness();
    login_session(&h).await;
    let user = h.users.find_by_subject("u1").await.unwrap().unwrap();
    assert_eq!(h.users.group_members("editors").await.unwrap(), vec![user.id()]);

    h.provider.set_claims(claims(&[]));
    login_session(&h).await;

    assert!(h.users.group_members("editors").await.unwrap().is_empty());
    let user_after = h.users.find_by_subject("u1").await.unwrap().unwrap();
    assert_eq!(user_after.id(), user.id());
    assert!(user_after.groups().is_empty());
}

#[tokio::test]
async fn unknown_user_without_auto_create_is_forbidden() {
    let config = oidc_config().create_user(false).build();
    let h = harness_with(config, FakeProvider::new(claims(&["editors"])));

    let resp = login(&h, None).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(h.users.is_empty());
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn user_outside_access_group_is_refused() {
    let config = oidc_config().access_group("employees".to_string()).build();
    let h = harness_with(config, FakeProvider::new(claims(&["editors"])));

    let resp = login(&h, None).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(h.users.is_empty());
    assert!(h.sessions.is_empty());
}

#[tokio::test]
async fn user_leaving_access_group_is_deactivated() {
    let config = oidc_config().access_group("employees".to_string()).build();
    let h = harness_with(config, FakeProvider::new(claims(&["employees"])));
    login_session(&h).await;

    h.provider.set_claims(claims(&["editors"]));
    let resp = login(&h, None).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(set_cookie(&resp, "session").is_none());
    let user = h.users.find_by_subject("u1").await.unwrap().unwrap();
    assert!(!user.is_active());
}

#[tokio::test]
async fn staff_group_sets_staff_flag() {
    let config = oidc_config().staff_group("admins".to_string()).build();
    let h = harness_with(config, FakeProvider::new(claims(&["admins"])));

    login_session(&h).await;

    let user = h.users.find_by_subject("u1").await.unwrap().unwrap();
    assert!(user.is_staff());
}

#[tokio::test]
async fn login_replaces_previous_session() {
    let h = harness();
    let first = login_session(&h).await;

    let resp = login(&h, Some(&format!("session={first}"))).await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    let second = set_cookie(&resp, "session").expect("session cookie");
    assert_ne!(first, second);
    assert_eq!(h.sessions.len(), 1);
    assert!(
        h.sessions
            .find_by_id(&SessionId::new(first))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn off_site_next_is_ignored() {
    let h = harness();

    let login_state = start_login(&h, Some("https://evil.example.com/")).await;
    let resp = send(
        &h,
        get(
            &format!("/oidc/callback?code=good&state={CSRF}"),
            Some(&format!("auth_state={login_state}")),
        ),
    )
    .await;

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn health_responds() {
    let h = harness();

    let resp = send(&h, get("/health", None)).await;

    assert_eq!(resp.status(), StatusCode::OK);
}
