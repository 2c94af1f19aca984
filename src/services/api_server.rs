// src/services/api_server.rs
//! HTTP surface of the session service.
//!
//! Built on Axum. The access gate is bound exactly once, as the
//! `enforce_access` middleware, and hands typed [`Claims`] to protected
//! handlers through request extensions.
//!
//! Endpoints:
//! - `POST /api/auth/login`: exchange username/password for a token pair
//! - `POST /api/auth/refresh`: exchange a refresh token for an access token
//! - `POST /api/auth/logout`: revoke the presented token (and optionally a refresh token)
//! - `GET  /api/protected`: any valid access token
//! - `GET  /api/admin/dashboard`: access token with role `admin`

use crate::error::{AuthError, PasswordError, StoreError};
use crate::models::claims::Claims;
use crate::services::access_gate::{bearer_token, AccessGate, DenialReason, GateDecision};
use crate::services::credential_manager::{CredentialManager, Revocation};
use crate::storage::user_repository::UserRepository;
use crate::utils::password::PasswordHasher;
use axum::{
    extract::{Json, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;

// API request and response structures

/// Request payload for logging in
#[derive(Serialize, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// Response carrying freshly issued credentials
#[derive(Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    token_type: String,
    /// Access token lifetime in seconds
    expires_in: u64,
}

/// Optional logout body, used to sign the device's refresh token out as well
#[derive(Serialize, Deserialize)]
struct LogoutRequest {
    refresh_token: Option<String>,
}

/// Error raised by a handler, rendered as `{"message": ...}`.
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Unavailable,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "authentication temporarily unavailable".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_string(),
            ),
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<DenialReason> for ApiError {
    fn from(reason: DenialReason) -> Self {
        if reason.is_forbidden() {
            ApiError::Forbidden(reason.to_string())
        } else {
            ApiError::Unauthorized(reason.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!("Revocation store failure: {}", err);
        ApiError::Unavailable
    }
}

/// Which role, if any, a gated route group requires.
#[derive(Clone)]
struct GateBinding {
    gate: AccessGate,
    required_role: Option<&'static str>,
}

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Issues, verifies, refreshes and revokes credentials
    credential_manager: Arc<CredentialManager>,

    /// Request admission
    access_gate: AccessGate,

    /// User lookup for login
    users: Arc<dyn UserRepository>,

    /// Password verification, run on the blocking pool
    password_hasher: Arc<PasswordHasher>,

    /// Caps concurrent password verifications
    login_permits: Arc<Semaphore>,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `credential_manager` - Credential lifecycle engine
    /// * `users` - User repository consulted on login
    /// * `password_hasher` - Verifies submitted passwords
    /// * `login_concurrency` - Maximum password verifications in flight
    pub fn new(
        credential_manager: Arc<CredentialManager>,
        users: Arc<dyn UserRepository>,
        password_hasher: PasswordHasher,
        login_concurrency: usize,
    ) -> Self {
        ApiServer {
            access_gate: AccessGate::new(credential_manager.clone()),
            credential_manager,
            users,
            password_hasher: Arc::new(password_hasher),
            login_permits: Arc::new(Semaphore::new(login_concurrency)),
        }
    }

    /// Builds the router with all routes and middleware attached.
    pub fn router(&self) -> Router {
        let authenticated = GateBinding {
            gate: self.access_gate.clone(),
            required_role: None,
        };
        let admin_only = GateBinding {
            gate: self.access_gate.clone(),
            required_role: Some("admin"),
        };

        let protected = Router::new()
            .route("/protected", get(Self::protected_handler))
            .route_layer(middleware::from_fn_with_state(authenticated, enforce_access));

        let admin = Router::new()
            .route("/admin/dashboard", get(Self::admin_dashboard_handler))
            .route_layer(middleware::from_fn_with_state(admin_only, enforce_access));

        let auth = Router::new()
            .route("/auth/login", post(Self::login_handler))
            .route("/auth/refresh", post(Self::refresh_handler))
            .route("/auth/logout", post(Self::logout_handler))
            .with_state(self.clone());

        Router::new()
            .route("/", get(|| async { "Session Guard API" }))
            .nest("/api", auth.merge(protected).merge(admin))
            .layer(CorsLayer::permissive())
    }

    /// Starts the API server and serves until `shutdown` resolves
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "0.0.0.0:8080")
    /// * `shutdown` - Future that completes when the server should stop
    pub async fn run<F>(&self, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }

    // =====================
    // Credential Handlers
    // =====================

    /// Authenticates a user and returns an access/refresh pair
    ///
    /// # Endpoint
    /// POST /api/auth/login
    ///
    /// # Responses
    /// - 200 OK: token pair
    /// - 400 Bad Request: missing username or password
    /// - 401 Unauthorized: unknown user or wrong password
    async fn login_handler(
        State(state): State<ApiServer>,
        Json(payload): Json<LoginRequest>,
    ) -> Result<Json<TokenResponse>, ApiError> {
        if payload.username.is_empty() || payload.password.is_empty() {
            return Err(ApiError::BadRequest(
                "username and password are required".into(),
            ));
        }

        let user = match state.users.get_by_username(&payload.username).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("Login failed: unknown user {}", payload.username);
                return Err(ApiError::Unauthorized("invalid credentials".into()));
            }
            Err(e) => {
                error!("User lookup failed: {}", e);
                return Err(ApiError::Internal);
            }
        };

        let permit = state
            .login_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ApiError::Internal)?;
        let hasher = state.password_hasher.clone();
        let stored_hash = user.password_hash.clone();
        let verified = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            hasher.verify(&payload.password, &stored_hash)
        })
        .await
        .map_err(|e| {
            error!("Password verification task failed: {}", e);
            ApiError::Internal
        })?;

        match verified {
            Ok(true) => {}
            Ok(false) => {
                warn!("Login failed: wrong password for {}", user.username);
                return Err(ApiError::Unauthorized("invalid credentials".into()));
            }
            Err(PasswordError::Malformed(reason)) => {
                error!("Stored password record for {} is malformed: {}", user.username, reason);
                return Err(ApiError::Unauthorized("invalid credentials".into()));
            }
            Err(e) => {
                error!("Password verification failed for {}: {}", user.username, e);
                return Err(ApiError::Internal);
            }
        }

        let pair = state.credential_manager.issue(&user).map_err(|e| {
            error!("Failed to issue credentials: {}", e);
            ApiError::Internal
        })?;
        info!("Issued credentials for user {}", user.id);

        Ok(Json(TokenResponse {
            access_token: pair.access.token,
            refresh_token: Some(pair.refresh.token),
            token_type: "Bearer".into(),
            expires_in: state.credential_manager.access_ttl().as_secs(),
        }))
    }

    /// Exchanges a refresh token for a new access token
    ///
    /// # Endpoint
    /// POST /api/auth/refresh (refresh token as Bearer credential)
    ///
    /// # Responses
    /// - 200 OK: new access token
    /// - 401 Unauthorized: missing, invalid, expired, revoked or non-refresh token
    /// - 503 Service Unavailable: revocation status unknown
    async fn refresh_handler(
        State(state): State<ApiServer>,
        headers: HeaderMap,
    ) -> Result<Json<TokenResponse>, ApiError> {
        let token = bearer_token(authorization(&headers))?;

        let access = match state.credential_manager.refresh(token).await {
            Ok(access) => access,
            Err(AuthError::Infrastructure(e)) => return Err(e.into()),
            Err(e) => {
                warn!("Refresh rejected: {}", e);
                return Err(ApiError::Unauthorized("invalid refresh token".into()));
            }
        };

        Ok(Json(TokenResponse {
            access_token: access.token,
            refresh_token: None,
            token_type: "Bearer".into(),
            expires_in: state.credential_manager.access_ttl().as_secs(),
        }))
    }

    /// Revokes the presented credential, and the refresh token if one is supplied
    ///
    /// # Endpoint
    /// POST /api/auth/logout
    ///
    /// # Responses
    /// - 200 OK: revoked (or already expired)
    /// - 401 Unauthorized: missing header or any undecodable token (nothing is revoked)
    /// - 503 Service Unavailable: revocation could not be recorded
    async fn logout_handler(
        State(state): State<ApiServer>,
        headers: HeaderMap,
        body: Option<Json<LogoutRequest>>,
    ) -> Result<Json<serde_json::Value>, ApiError> {
        let token = bearer_token(authorization(&headers))?;

        let extra = match body {
            Some(Json(LogoutRequest {
                refresh_token: Some(refresh),
            })) => Some(refresh),
            _ => None,
        };
        let mut tokens = vec![token];
        if let Some(refresh) = extra.as_deref() {
            tokens.push(refresh);
        }

        let outcomes = match state.credential_manager.revoke_all(&tokens).await {
            Ok(outcomes) => outcomes,
            Err(AuthError::Infrastructure(e)) => return Err(e.into()),
            Err(e) => {
                warn!("Logout rejected: {}", e);
                return Err(ApiError::Unauthorized("invalid token".into()));
            }
        };

        for outcome in outcomes {
            match outcome {
                Revocation::Recorded { credential_id, ttl } => {
                    info!("Revoked credential {} for {:?}", credential_id, ttl);
                }
                Revocation::AlreadyExpired { credential_id } => {
                    info!("Credential {} already expired, nothing to revoke", credential_id);
                }
            }
        }

        Ok(Json(json!({ "message": "successfully logged out" })))
    }

    // =====================
    // Protected Handlers
    // =====================

    /// Echoes the authenticated caller
    async fn protected_handler(Extension(claims): Extension<Claims>) -> impl IntoResponse {
        Json(json!({
            "message": "This is a protected resource",
            "user": {
                "id": claims.user_id,
                "username": claims.username,
                "role": claims.role,
            }
        }))
    }

    async fn admin_dashboard_handler() -> impl IntoResponse {
        Json(json!({ "message": "This is an admin-only resource" }))
    }
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}

/// Runs the access gate and, on admission, attaches the typed claims.
async fn enforce_access(
    State(binding): State<GateBinding>,
    mut request: Request,
    next: Next,
) -> Response {
    let decision = binding
        .gate
        .admit_header(authorization(request.headers()), binding.required_role)
        .await;

    match decision {
        Ok(GateDecision::Admitted(claims)) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Ok(GateDecision::Denied(reason)) => {
            warn!("Request to {} denied: {}", request.uri().path(), reason);
            ApiError::from(reason).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
