//! HTTP routes for sign-in, the session report and logout.

use std::sync::Arc;

use auth::oauth::CallbackParams;
use auth::token::derive_session_id;
use auth::{
    cookies, AccountStore, CookieTransport, CurrentSession, GitHubOAuth, GoogleOAuth, Handshake,
    IdentityProvider, SessionManager, StoreError,
};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

const LOGIN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
<h1>Sign in</h1>
<a href="/api/login/github">Sign in with GitHub</a>
<a href="/api/login/google">Sign in with Google</a>
</body>
</html>
"#;

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub accounts: Arc<dyn AccountStore>,
    pub cookies: CookieTransport,
    pub github: Arc<GitHubOAuth>,
    pub google: Arc<GoogleOAuth>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(current_session).post(logout))
        .route("/login", get(login_page))
        .route("/api/login/github", get(github_login))
        .route("/api/login/github/callback", get(github_callback))
        .route("/api/login/google", get(google_login))
        .route("/api/login/google/callback", get(google_callback))
        .with_state(state)
}

/// All `Cookie` headers of the request joined into one.
fn cookie_header(headers: &HeaderMap) -> Option<String> {
    let values: Vec<&str> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();
    (!values.is_empty()).then(|| values.join("; "))
}

fn internal_error(err: StoreError) -> StatusCode {
    tracing::error!("session store failed: {}", err);
    StatusCode::INTERNAL_SERVER_ERROR
}

fn handshake<'a>(state: &'a AppState, provider: &'a dyn IdentityProvider) -> Handshake<'a> {
    Handshake::new(provider, &state.cookies, state.accounts.as_ref(), &state.sessions)
}

async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CurrentSession>, StatusCode> {
    let validated = state
        .sessions
        .current(cookie_header(&headers).as_deref())
        .await
        .map_err(internal_error)?;
    Ok(Json(validated.into()))
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let clear = [(SET_COOKIE, state.cookies.clear_session_cookie())];
    let token = cookies::parse(cookies::SESSION_COOKIE, cookie_header(&headers).as_deref());

    if let Some(token) = token {
        if let Err(e) = state.sessions.invalidate(&derive_session_id(&token)).await {
            return (internal_error(e), clear).into_response();
        }
        tracing::info!("signed out");
    }
    (StatusCode::OK, clear).into_response()
}

async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, StatusCode> {
    let validated = state
        .sessions
        .current(cookie_header(&headers).as_deref())
        .await
        .map_err(internal_error)?;

    if validated.is_some() {
        return Ok((StatusCode::FOUND, [(LOCATION, "/")]).into_response());
    }
    Ok(Html(LOGIN_PAGE).into_response())
}

fn initiate(state: &AppState, provider: &dyn IdentityProvider) -> Response {
    match handshake(state, provider).initiate() {
        Ok(headers) => (StatusCode::FOUND, headers).into_response(),
        Err(e) => {
            tracing::error!(provider = %provider.name(), "could not start sign-in: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// An unreadable query counts as one without `code` or `state`.
fn callback_params(query: Result<Query<CallbackParams>, QueryRejection>) -> CallbackParams {
    match query {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::debug!("unreadable callback query: {}", rejection);
            CallbackParams::default()
        }
    }
}

async fn complete(
    state: &AppState,
    provider: &dyn IdentityProvider,
    headers: &HeaderMap,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    let params = callback_params(query);
    let handshake = handshake(state, provider);
    match handshake
        .complete(cookie_header(headers).as_deref(), &params)
        .await
    {
        Ok(completion) => (StatusCode::FOUND, completion.headers).into_response(),
        Err(e) => {
            let clear = handshake.clear_transients().unwrap_or_default();
            (StatusCode::BAD_REQUEST, clear, e.user_message()).into_response()
        }
    }
}

async fn github_login(State(state): State<AppState>) -> Response {
    initiate(&state, state.github.as_ref())
}

async fn github_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    complete(&state, state.github.as_ref(), &headers, query).await
}

async fn google_login(State(state): State<AppState>) -> Response {
    initiate(&state, state.google.as_ref())
}

async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<CallbackParams>, QueryRejection>,
) -> Response {
    complete(&state, state.google.as_ref(), &headers, query).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::error::{RESTART_MESSAGE, UNVERIFIED_EMAIL_MESSAGE};
    use auth::{MemoryStore, OAuthConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use oauth2::url::Url;
    use oauth2::{AuthUrl, TokenUrl};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Point a provider config at the mock server.
    fn mocked(mut config: OAuthConfig, server: &str) -> OAuthConfig {
        config.auth_url = AuthUrl::new(format!("{server}/authorize")).unwrap();
        config.token_url = TokenUrl::new(format!("{server}/token")).unwrap();
        config.profile_url = Url::parse(&format!("{server}/user")).unwrap();
        if config.emails_url.is_some() {
            config.emails_url = Some(Url::parse(&format!("{server}/user/emails")).unwrap());
        }
        config
    }

    fn app(server: &str, store: &MemoryStore) -> Router {
        let base = "http://localhost:8080";
        let github = OAuthConfig::github("gh-id", "gh-secret", base).unwrap();
        let google = OAuthConfig::google("g-id", "g-secret", base).unwrap();
        router(AppState {
            sessions: SessionManager::new(Arc::new(store.clone())),
            accounts: Arc::new(store.clone()),
            cookies: CookieTransport::new(false, Some(&[1u8; 32][..])).unwrap(),
            github: Arc::new(GitHubOAuth::new(
                mocked(github, server),
                auth::oauth::http_client().unwrap(),
            )),
            google: Arc::new(GoogleOAuth::new(
                mocked(google, server),
                auth::oauth::http_client().unwrap(),
            )),
        })
    }

    async fn mock_github(server: &MockServer, emails: Value) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "gho_token",
                "token_type": "bearer"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 42,
                "login": "octocat"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/emails"))
            .respond_with(ResponseTemplate::new(200).set_body_json(emails))
            .mount(server)
            .await;
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut request = get(uri, cookie);
        *request.method_mut() = axum::http::Method::POST;
        request
    }

    /// The `Cookie` header a browser sends back after this response.
    fn browser_cookies(response: &Response) -> String {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
            .filter(|c| !c.ends_with('='))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn location(response: &Response) -> &str {
        response.headers().get(LOCATION).unwrap().to_str().unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Run the GitHub sign-in through the router and return the session cookie.
    async fn sign_in(app: &Router) -> Response {
        let start = app
            .clone()
            .oneshot(get("/api/login/github", None))
            .await
            .unwrap();
        let state = Url::parse(location(&start))
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        app.clone()
            .oneshot(get(
                &format!("/api/login/github/callback?code=the-code&state={state}"),
                Some(&browser_cookies(&start)),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_signed_out_report_is_null() {
        let server = MockServer::start().await;
        let app = app(&server.uri(), &MemoryStore::new());

        let response = app.oneshot(get("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "session": null, "user": null }));
    }

    #[tokio::test]
    async fn test_login_page_lists_providers() {
        let server = MockServer::start().await;
        let app = app(&server.uri(), &MemoryStore::new());

        let response = app.oneshot(get("/login", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains(r#"href="/api/login/github""#));
        assert!(body.contains(r#"href="/api/login/google""#));
    }

    #[tokio::test]
    async fn test_initiate_redirects_to_provider() {
        let server = MockServer::start().await;
        let app = app(&server.uri(), &MemoryStore::new());

        let response = app
            .clone()
            .oneshot(get("/api/login/github", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).starts_with(&format!("{}/authorize?", server.uri())));
        assert_eq!(set_cookies(&response).len(), 1);

        let response = app.oneshot(get("/api/login/google", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(location(&response).contains("code_challenge_method=S256"));
        assert_eq!(set_cookies(&response).len(), 2);
    }

    #[tokio::test]
    async fn test_callback_without_params_is_bad_request() {
        let server = MockServer::start().await;
        let app = app(&server.uri(), &MemoryStore::new());

        let response = app
            .oneshot(get("/api/login/google/callback", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let cleared = set_cookies(&response);
        assert!(cleared.iter().any(|c| c.starts_with("google_oauth_state=;")));
        assert!(cleared.iter().any(|c| c.starts_with("google_code_verifier=;")));
        assert_eq!(body_text(response).await, RESTART_MESSAGE);
    }

    #[tokio::test]
    async fn test_repeated_query_parameter_is_generic_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let app = app(&server.uri(), &MemoryStore::new());

        let start = app
            .clone()
            .oneshot(get("/api/login/github", None))
            .await
            .unwrap();
        let response = app
            .oneshot(get(
                "/api/login/github/callback?code=a&state=x&state=y",
                Some(&browser_cookies(&start)),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("github_oauth_state=;")));
        assert_eq!(body_text(response).await, RESTART_MESSAGE);
    }

    #[tokio::test]
    async fn test_sign_in_report_and_logout() {
        let server = MockServer::start().await;
        mock_github(
            &server,
            json!([{ "email": "octocat@example.com", "primary": true, "verified": true }]),
        )
        .await;
        let store = MemoryStore::new();
        let app = app(&server.uri(), &store);

        let callback = sign_in(&app).await;
        assert_eq!(callback.status(), StatusCode::FOUND);
        assert_eq!(location(&callback), "/");
        let session_cookie = browser_cookies(&callback);
        assert!(session_cookie.starts_with("auth-session="));

        let response = app
            .clone()
            .oneshot(get("/", Some(&session_cookie)))
            .await
            .unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["user"]["username"], "octocat");
        assert_eq!(body["user"]["email"], "octocat@example.com");
        assert!(body["session"]["expires_at"].is_string());

        let response = app
            .clone()
            .oneshot(get("/login", Some(&session_cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");

        let response = app
            .clone()
            .oneshot(post("/", Some(&session_cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response)[0].starts_with("auth-session=;"));
        assert_eq!(store.session_count(), 0);

        let response = app.oneshot(get("/", Some(&session_cookie))).await.unwrap();
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["user"], Value::Null);
    }

    #[tokio::test]
    async fn test_logout_without_session_clears_cookie() {
        let server = MockServer::start().await;
        let app = app(&server.uri(), &MemoryStore::new());

        let response = app.oneshot(post("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cleared = set_cookies(&response);
        assert!(cleared[0].starts_with("auth-session=;"));
        assert!(cleared[0].contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
    }

    #[tokio::test]
    async fn test_unverified_email_message() {
        let server = MockServer::start().await;
        mock_github(
            &server,
            json!([{ "email": "octocat@example.com", "primary": true, "verified": false }]),
        )
        .await;
        let store = MemoryStore::new();
        let app = app(&server.uri(), &store);

        let response = sign_in(&app).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(set_cookies(&response)
            .iter()
            .any(|c| c.starts_with("github_oauth_state=;")));
        assert_eq!(body_text(response).await, UNVERIFIED_EMAIL_MESSAGE);
        assert_eq!(store.account_count(), 0);
    }
}
