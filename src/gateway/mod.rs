//! Axum-based HTTP gateway for the browser extension.
//!
//! - Loopback only unless `[gateway] allow_public_bind = true`
//! - Falls forward to the next free port when the configured one is taken
//! - Request body size limit (64KB) and request timeout (30s)
//! - CORS restricted to the configured extension origins
//!
//! bcrypt work runs on the blocking pool.

use crate::auth::{
    AuthError, AuthService, CredentialStore, LoginOutcome, PasswordHasher, SessionRegistry,
    TokenStatus,
};
use crate::browser::{self, BrowserLauncher, ChromeLauncher, NoopLauncher};
use crate::config::{Config, GatewayConfig};
use anyhow::{Context, Result};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, request::Parts, HeaderValue, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout (30s)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Profile assumed when a login request does not name one.
pub const DEFAULT_PROFILE: &str = "Default";

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    /// Chrome user data dir scanned by `/profiles` (`None` = no discovery).
    pub chrome_user_data_dir: Option<PathBuf>,
}

/// Concrete return type for handlers (avoids `impl IntoResponse` inference issues).
type ApiResponse = (StatusCode, Json<serde_json::Value>);

/// Whether binding `host` would expose the gateway beyond this machine.
pub fn is_public_bind(host: &str) -> bool {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") {
        return false;
    }
    match host.parse::<IpAddr>() {
        Ok(ip) => !ip.is_loopback(),
        Err(_) => true,
    }
}

/// Bind `host:port`, moving on to the following ports while they are in use.
pub async fn bind_with_fallback(host: &str, port: u16, attempts: u16) -> Result<TcpListener> {
    let attempts = attempts.max(1);
    let mut last_err = None;

    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    tracing::warn!(
                        "Port {port} is in use. Using port {} instead.",
                        listener.local_addr().map(|a| a.port()).unwrap_or(candidate)
                    );
                }
                return Ok(listener);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port = candidate, "Port in use, trying next");
                last_err = Some(e);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to bind {host}:{candidate}"));
            }
        }
    }

    match last_err {
        Some(e) => Err(e).with_context(|| {
            format!("No free port in {port}..{} on {host}", port.saturating_add(attempts))
        }),
        None => anyhow::bail!("No port available to try from {port} on {host}"),
    }
}

/// `pattern` is an exact origin, or a prefix followed by `*`.
fn origin_matches(pattern: &str, origin: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => origin.starts_with(prefix),
        None => pattern == origin,
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let patterns: Arc<[String]> = allowed_origins.into();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|o| patterns.iter().any(|p| origin_matches(p, o)))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Build the router with middleware.
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/profiles", get(handle_profiles))
        .route("/auth/login", post(handle_login))
        .route("/auth/verify", get(handle_verify))
        .route("/auth/logout", post(handle_logout))
        .route("/admin/add-profile", post(handle_add_profile))
        .route("/admin/change-password", post(handle_change_password))
        .with_state(state)
        .layer(cors_layer(&gateway.allowed_origins))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Assemble the auth service from config.
pub fn build_auth_service(config: &Config, no_launch: bool) -> Result<AuthService> {
    let store_path = config.store_path();
    let store = CredentialStore::open(&store_path);
    store
        .ensure_initialized()
        .with_context(|| format!("Failed to initialize {}", store_path.display()))?;

    let launcher: Arc<dyn BrowserLauncher> = if no_launch || !config.browser.launch_on_guest {
        Arc::new(NoopLauncher)
    } else {
        let chrome = ChromeLauncher::detect(config.browser.executable.as_deref());
        tracing::info!("Using Chrome executable: {}", chrome.executable().display());
        Arc::new(chrome)
    };

    Ok(AuthService::new(
        store,
        PasswordHasher::new(config.store.bcrypt_cost),
        Arc::new(SessionRegistry::with_ttl(config.session.ttl_secs)),
        launcher,
    ))
}

/// Run the HTTP gateway until Ctrl-C.
pub async fn run_gateway(config: Config, no_launch: bool) -> Result<()> {
    let host = config.gateway.host.as_str();
    // ── Security: refuse public bind without explicit opt-in ──
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "🛑 Refusing to bind to {host}: the auth API would be reachable from the network.\n\
             Fix: use --host 127.0.0.1 (default), or set\n\
             [gateway] allow_public_bind = true in config.toml (NOT recommended)."
        );
    }

    let auth = Arc::new(build_auth_service(&config, no_launch)?);
    match auth.list_profiles() {
        Ok(profiles) => tracing::info!(?profiles, "Loaded profile configurations"),
        Err(e) => tracing::warn!("Could not list profiles at startup: {e}"),
    }

    // ── Optional expired-token sweep ───────────────────────
    if config.session.sweep_interval_secs > 0 {
        let sessions = Arc::clone(auth.sessions());
        let every = Duration::from_secs(config.session.sweep_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = sessions.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired session tokens");
                }
            }
        });
    }

    let state = AppState {
        auth,
        chrome_user_data_dir: config.chrome_user_data_dir(),
    };
    let app = build_router(state, &config.gateway);

    let listener = bind_with_fallback(
        host,
        config.gateway.port,
        config.gateway.port_search_attempts,
    )
    .await?;
    let addr = listener.local_addr()?;
    tracing::info!("Server running at http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ══════════════════════════════════════════════════════════════════════════════

fn detail(status: StatusCode, message: impl Into<String>) -> ApiResponse {
    (
        status,
        Json(serde_json::json!({ "detail": message.into() })),
    )
}

fn auth_error_response(err: AuthError) -> ApiResponse {
    let status = match &err {
        AuthError::AlreadyExists(_)
        | AuthError::InvalidProfile
        | AuthError::HashCollision
        | AuthError::PasswordTooLong(_) => StatusCode::BAD_REQUEST,
        AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
        AuthError::NotFound(_) => StatusCode::NOT_FOUND,
        AuthError::Hashing(_) => {
            tracing::error!("Auth operation failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        AuthError::Storage(source) => {
            tracing::error!("Auth operation failed: {source:#}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    detail(status, err.to_string())
}

fn bad_json(rejection: &JsonRejection) -> ApiResponse {
    detail(
        StatusCode::BAD_REQUEST,
        format!("Invalid request: {rejection}"),
    )
}

/// Run CPU-heavy or blocking work off the reactor.
async fn blocking<T, F>(f: F) -> Result<T, ApiResponse>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("Blocking auth task failed: {e}");
        detail(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    })
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// Request body for login.
#[derive(Debug, Deserialize)]
struct LoginBody {
    password: String,
    #[serde(default = "default_profile")]
    profile: String,
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

#[derive(Debug, Deserialize)]
struct VerifyQuery {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogoutBody {
    token: String,
}

#[derive(Debug, Deserialize)]
struct AddProfileBody {
    profile: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordBody {
    profile: String,
    current_password: String,
    new_password: String,
}

fn login_response(outcome: LoginOutcome) -> serde_json::Value {
    match outcome {
        LoginOutcome::Registered { profile, token } => serde_json::json!({
            "status": "success",
            "profile_launched": profile,
            "token": token,
            "message": "Profile password set",
        }),
        LoginOutcome::Authenticated {
            profile,
            token,
            different_profile,
            claimed_profile,
        } => serde_json::json!({
            "status": "success",
            "profile_launched": profile,
            "token": token,
            "different_profile": different_profile,
            "current_profile": claimed_profile,
        }),
        LoginOutcome::Guest => serde_json::json!({ "status": "guest" }),
    }
}

/// GET /health: always public (no secrets leaked)
async fn handle_health(State(state): State<AppState>) -> ApiResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "active_sessions": state.auth.sessions().active_count(),
        })),
    )
}

/// GET /profiles: profiles known to the store plus Chrome profiles on disk.
async fn handle_profiles(State(state): State<AppState>) -> ApiResponse {
    let auth = Arc::clone(&state.auth);
    let user_data_dir = state.chrome_user_data_dir.clone();
    let result = blocking(move || {
        let app_profiles = auth.list_profiles();
        let chrome_profiles = user_data_dir
            .as_deref()
            .map(browser::discover_chrome_profiles)
            .unwrap_or_default();
        (app_profiles, chrome_profiles)
    })
    .await;

    match result {
        Ok((Ok(app_profiles), chrome_profiles)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "app_profiles": app_profiles,
                "chrome_profiles": chrome_profiles,
            })),
        ),
        Ok((Err(e), _)) => auth_error_response(e),
        Err(resp) => resp,
    }
}

/// POST /auth/login: match a password to a profile, register, or fall back to guest.
async fn handle_login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_json(&e),
    };

    let auth = Arc::clone(&state.auth);
    match blocking(move || auth.login(&body.password, &body.profile)).await {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(login_response(outcome))),
        Ok(Err(e)) => auth_error_response(e),
        Err(resp) => resp,
    }
}

/// GET /auth/verify?token=...: never an HTTP error.
async fn handle_verify(
    State(state): State<AppState>,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> ApiResponse {
    let token = match query {
        Ok(Query(q)) => q.token.unwrap_or_default(),
        Err(e) => {
            tracing::debug!("Unparseable verify query: {e}");
            return (StatusCode::OK, Json(serde_json::json!({ "valid": false })));
        }
    };
    let body = match state.auth.verify_token(&token) {
        TokenStatus::Valid { profile_id } => {
            serde_json::json!({ "valid": true, "profile": profile_id })
        }
        TokenStatus::Invalid => serde_json::json!({ "valid": false }),
    };
    (StatusCode::OK, Json(body))
}

/// POST /auth/logout: revoke a token.
async fn handle_logout(
    State(state): State<AppState>,
    body: Result<Json<LogoutBody>, JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_json(&e),
    };
    let revoked = state.auth.logout(&body.token);
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "success", "revoked": revoked })),
    )
}

/// POST /admin/add-profile: register a profile password explicitly.
async fn handle_add_profile(
    State(state): State<AppState>,
    body: Result<Json<AddProfileBody>, JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_json(&e),
    };

    let auth = Arc::clone(&state.auth);
    let profile = body.profile.clone();
    match blocking(move || auth.add_profile(&body.profile, &body.password)).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "message": format!("Profile {profile} added successfully"),
            })),
        ),
        Ok(Err(e)) => auth_error_response(e),
        Err(resp) => resp,
    }
}

/// POST /admin/change-password: replace a profile password.
async fn handle_change_password(
    State(state): State<AppState>,
    body: Result<Json<ChangePasswordBody>, JsonRejection>,
) -> ApiResponse {
    let body = match body {
        Ok(Json(b)) => b,
        Err(e) => return bad_json(&e),
    };

    let auth = Arc::clone(&state.auth);
    let profile = body.profile.clone();
    let result = blocking(move || {
        auth.change_password(&body.profile, &body.current_password, &body.new_password)
    })
    .await;

    match result {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "message": format!("Password for profile {profile} changed successfully"),
            })),
        ),
        Ok(Err(e)) => auth_error_response(e),
        Err(resp) => resp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hasher::MIN_COST;
    use axum::http::Uri;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingLauncher {
        launches: Mutex<Vec<Option<String>>>,
    }

    impl BrowserLauncher for RecordingLauncher {
        fn launch(&self, profile: Option<&str>) {
            self.launches.lock().push(profile.map(str::to_string));
        }
    }

    fn test_state() -> (AppState, Arc<RecordingLauncher>) {
        let launcher = Arc::new(RecordingLauncher::default());
        let auth = AuthService::new(
            CredentialStore::in_memory(),
            PasswordHasher::new(MIN_COST),
            Arc::new(SessionRegistry::new()),
            launcher.clone(),
        );
        let state = AppState {
            auth: Arc::new(auth),
            chrome_user_data_dir: None,
        };
        (state, launcher)
    }

    async fn body_json(resp: ApiResponse) -> (StatusCode, serde_json::Value) {
        let response = resp.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn login(password: &str, profile: &str) -> Result<Json<LoginBody>, JsonRejection> {
        Ok(Json(LoginBody {
            password: password.into(),
            profile: profile.into(),
        }))
    }

    fn parse_verify(uri: &str) -> Result<Query<VerifyQuery>, QueryRejection> {
        Query::try_from_uri(&uri.parse::<Uri>().unwrap())
    }

    fn verify_query(token: &str) -> Result<Query<VerifyQuery>, QueryRejection> {
        parse_verify(&format!("/auth/verify?token={token}"))
    }

    #[test]
    fn security_body_limit_is_64kb() {
        assert_eq!(MAX_BODY_SIZE, 65_536);
    }

    #[test]
    fn app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[test]
    fn login_body_defaults_profile() {
        let parsed: LoginBody = serde_json::from_str(r#"{"password": "pw"}"#).unwrap();
        assert_eq!(parsed.profile, "Default");

        let missing: Result<LoginBody, _> = serde_json::from_str(r#"{"profile": "x"}"#);
        assert!(missing.is_err());
    }

    #[test]
    fn public_bind_detection() {
        assert!(!is_public_bind("127.0.0.1"));
        assert!(!is_public_bind("localhost"));
        assert!(!is_public_bind("::1"));
        assert!(!is_public_bind("[::1]"));
        assert!(is_public_bind("0.0.0.0"));
        assert!(is_public_bind("192.168.1.10"));
        assert!(is_public_bind("example.com"));
    }

    #[test]
    fn origin_patterns() {
        assert!(origin_matches("chrome-extension://*", "chrome-extension://abcdef"));
        assert!(!origin_matches("chrome-extension://*", "https://evil.example"));
        assert!(origin_matches("http://127.0.0.1:8765", "http://127.0.0.1:8765"));
        assert!(!origin_matches("http://127.0.0.1:8765", "http://127.0.0.1:8766"));
        assert!(origin_matches("*", "anything"));
    }

    #[test]
    fn router_builds_with_default_config() {
        let (state, _) = test_state();
        let _router = build_router(state, &GatewayConfig::default());
    }

    #[tokio::test]
    async fn bind_falls_forward_when_port_taken() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let listener = bind_with_fallback("127.0.0.1", port, 5).await.unwrap();
        let got = listener.local_addr().unwrap().port();
        assert_ne!(got, port);
        assert!(got > port && got < port.saturating_add(5));
    }

    #[tokio::test]
    async fn bind_gives_up_after_attempts() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        assert!(bind_with_fallback("127.0.0.1", port, 1).await.is_err());
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (state, _) = test_state();
        let (status, body) = body_json(handle_health(State(state)).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["active_sessions"], 0);
    }

    #[tokio::test]
    async fn first_login_sets_password_and_token_verifies() {
        let (state, _) = test_state();

        let (status, body) =
            body_json(handle_login(State(state.clone()), login("pw", "Default")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["profile_launched"], "Default");
        assert_eq!(body["message"], "Profile password set");
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) =
            body_json(handle_verify(State(state), verify_query(&token)).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"valid": true, "profile": "Default"}));
    }

    #[tokio::test]
    async fn login_with_other_profiles_password_flags_difference() {
        let (state, _) = test_state();
        state.auth.add_profile("work", "pw-work").unwrap();
        state.auth.add_profile("home", "pw-home").unwrap();

        let (_, body) =
            body_json(handle_login(State(state), login("pw-home", "work")).await).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["profile_launched"], "home");
        assert_eq!(body["different_profile"], true);
        assert_eq!(body["current_profile"], "work");
    }

    #[tokio::test]
    async fn unmatched_password_is_guest_not_error() {
        let (state, launcher) = test_state();
        state.auth.add_profile("work", "pw").unwrap();

        let (status, body) =
            body_json(handle_login(State(state), login("nope", "work")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "guest"}));
        assert_eq!(*launcher.launches.lock(), vec![None]);
    }

    #[tokio::test]
    async fn verify_unknown_or_missing_token_is_invalid() {
        let (state, _) = test_state();
        let (status, body) =
            body_json(handle_verify(State(state.clone()), verify_query("bogus")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"valid": false}));

        let missing = parse_verify("/auth/verify");
        let (status, body) = body_json(handle_verify(State(state), missing).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], false);
    }

    #[tokio::test]
    async fn verify_with_unparseable_query_is_invalid_not_400() {
        let (state, _) = test_state();
        let (_, body) =
            body_json(handle_login(State(state.clone()), login("pw", "work")).await).await;
        let token = body["token"].as_str().unwrap().to_string();

        let duplicated = parse_verify(&format!("/auth/verify?token={token}&token=other"));
        assert!(duplicated.is_err());

        let (status, body) = body_json(handle_verify(State(state), duplicated).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"valid": false}));
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let (state, _) = test_state();
        let (_, body) =
            body_json(handle_login(State(state.clone()), login("pw", "work")).await).await;
        let token = body["token"].as_str().unwrap().to_string();

        let (_, body) = body_json(
            handle_logout(
                State(state.clone()),
                Ok(Json(LogoutBody {
                    token: token.clone(),
                })),
            )
            .await,
        )
        .await;
        assert_eq!(body["revoked"], true);

        let (_, body) =
            body_json(handle_verify(State(state), verify_query(&token)).await).await;
        assert_eq!(body["valid"], false);
    }

    #[tokio::test]
    async fn add_profile_conflict_is_400() {
        let (state, _) = test_state();
        let add = |password: &str| -> Result<Json<AddProfileBody>, JsonRejection> {
            Ok(Json(AddProfileBody {
                profile: "work".into(),
                password: password.into(),
            }))
        };

        let (status, body) =
            body_json(handle_add_profile(State(state.clone()), add("pw1")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Profile work added successfully");

        let (status, body) = body_json(handle_add_profile(State(state), add("pw2")).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn over_long_password_is_rejected_with_400() {
        let (state, _) = test_state();
        let long = "a".repeat(crate::auth::hasher::MAX_PASSWORD_BYTES + 8);
        let (status, body) = body_json(
            handle_add_profile(
                State(state.clone()),
                Ok(Json(AddProfileBody {
                    profile: "work".into(),
                    password: long,
                })),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("too long"));
        assert!(state.auth.list_profiles().unwrap().is_empty());
    }

    #[test]
    fn storage_failure_detail_is_generic() {
        let err = AuthError::from(
            anyhow::anyhow!("disk full").context("Failed to write /home/someone/creds.json"),
        );
        let (status, Json(body)) = auth_error_response(err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Credential store unavailable");
        assert!(!body.to_string().contains("/home/someone"));
    }

    #[tokio::test]
    async fn change_password_status_codes() {
        let (state, _) = test_state();
        state.auth.add_profile("work", "pw1").unwrap();
        let change =
            |profile: &str, current: &str| -> Result<Json<ChangePasswordBody>, JsonRejection> {
                Ok(Json(ChangePasswordBody {
                    profile: profile.into(),
                    current_password: current.into(),
                    new_password: "pw3".into(),
                }))
            };

        let (status, body) = body_json(
            handle_change_password(State(state.clone()), change("work", "wrong")).await,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["detail"], "Current password is incorrect");

        let (status, body) = body_json(
            handle_change_password(State(state.clone()), change("ghost", "pw1")).await,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Profile ghost not found");

        let (status, body) =
            body_json(handle_change_password(State(state), change("work", "pw1")).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["message"],
            "Password for profile work changed successfully"
        );
    }

    #[tokio::test]
    async fn profiles_lists_app_and_chrome_profiles() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("Default")).unwrap();
        std::fs::create_dir_all(tmp.path().join("Profile 1")).unwrap();

        let (mut state, _) = test_state();
        state.chrome_user_data_dir = Some(tmp.path().to_path_buf());
        state.auth.add_profile("Profile 1", "pw").unwrap();

        let (status, body) = body_json(handle_profiles(State(state)).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["app_profiles"], serde_json::json!(["Profile 1"]));
        let chrome = body["chrome_profiles"].as_array().unwrap();
        assert_eq!(chrome.len(), 2);
        assert_eq!(chrome[0]["name"], "Default");
        assert_eq!(chrome[0]["email"], serde_json::Value::Null);
    }

    #[test]
    fn build_auth_service_bootstraps_store_file() {
        let tmp = TempDir::new().unwrap();
        let store_path = tmp.path().join("creds.json");
        let mut config = Config::default();
        config.store.path = Some(store_path.clone());
        config.store.bcrypt_cost = MIN_COST;

        let auth = build_auth_service(&config, true).unwrap();
        assert_eq!(std::fs::read_to_string(&store_path).unwrap(), "{}");
        assert!(auth.list_profiles().unwrap().is_empty());
    }
}
