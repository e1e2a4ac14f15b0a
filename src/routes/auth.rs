/// Authentication Routes
///
/// Handles account registration, login, refresh-token rotation, and current
/// user information. All session semantics live in the engine; handlers only
/// parse the wire shape and attach client hints.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::auth::Claims;
use crate::error::{AppError, ErrorContext, StoreError};
use crate::routes::client_hints;
use crate::session::SessionEngine;

/// Account registration request
#[derive(Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

/// Login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Refresh-token rotation request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/signup
///
/// Register a new account. Returns the stored user summary on success.
///
/// # Validation
/// - Username: 3-32 chars, alphanumeric start, then alphanumerics plus . _ -
/// - Password: 8+ chars with digit, lowercase, and uppercase
///
/// # Errors
/// - 400: Validation errors (invalid username/password)
/// - 409: Username already registered
/// - 500: Internal server error
pub async fn signup(
    req: HttpRequest,
    form: web::Json<SignupRequest>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_signup");

    let user = engine
        .signup(&form.username, &form.password, &client_hints(&req))
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user.id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(user))
}

/// POST /auth/login
///
/// Authenticate with username and password. Opens a new session family and
/// returns an access/refresh credential pair.
///
/// # Errors
/// - 401: Invalid credentials (unknown user and bad password look the same)
/// - 429: Too many attempts from this client
/// - 500: Internal server error
pub async fn login(
    req: HttpRequest,
    form: web::Json<LoginRequest>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let bundle = engine
        .login(&form.username, &form.password, &client_hints(&req))
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        session_id = %bundle.session_id,
        family_id = %bundle.family_id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(bundle))
}

/// POST /auth/refresh
///
/// Rotate a refresh token. The presented token is retired and a fresh
/// credential pair is returned for the same session. Replaying a retired
/// token revokes the whole family.
///
/// # Errors
/// - 401: Unknown, expired, revoked, or replayed refresh token (one body
///   for all of them)
/// - 500: Internal server error
pub async fn refresh(
    req: HttpRequest,
    form: web::Json<RefreshRequest>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let bundle = engine
        .refresh(&form.refresh_token, &client_hints(&req))
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        session_id = %bundle.session_id,
        "Token refreshed successfully"
    );

    Ok(HttpResponse::Ok().json(bundle))
}

/// GET /api/me
///
/// Return the authenticated user's stored summary. Claims are attached by
/// the auth guard middleware.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 404: User no longer exists
/// - 500: Internal server error
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("get_current_user");

    let user_id = claims.user_id()?;
    let user = engine
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::Store(StoreError::NotFound("User not found".to_string())))?;

    tracing::debug!(
        request_id = %context.request_id,
        user_id = %user_id,
        "Current user info retrieved"
    );

    Ok(HttpResponse::Ok().json(user))
}
