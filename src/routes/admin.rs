/// Administrative Routes
///
/// Session oversight: targeted and family-wide revocation, live session
/// listing, the audit event stream, and aggregate statistics. Everything
/// here sits behind the auth guard.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, ErrorContext};
use crate::routes::client_hints;
use crate::session::SessionEngine;

const DEFAULT_EVENT_LIMIT: i64 = 200;

/// Targeted session revocation request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeSessionRequest {
    pub session_id: Uuid,
}

/// Family-wide revocation request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeFamilyRequest {
    pub family_id: Uuid,
}

/// Event listing query parameters
#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

/// POST /api/admin/revoke/session
///
/// Revoke one session. Revoking an already-revoked session is a no-op, not
/// an error; `revoked` reports whether this call did the work.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 500: Internal server error
pub async fn revoke_session(
    req: HttpRequest,
    form: web::Json<RevokeSessionRequest>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("admin_revoke_session");

    let revoked = engine
        .revoke_session(form.session_id, &client_hints(&req))
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        session_id = %form.session_id,
        revoked = revoked,
        "Session revocation processed"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true, "revoked": revoked })))
}

/// POST /api/admin/revoke/family
///
/// Mark a session family compromised and revoke every session under it.
/// Idempotent like targeted revocation.
///
/// # Errors
/// - 401: Missing or invalid token (handled by middleware)
/// - 500: Internal server error
pub async fn revoke_family(
    req: HttpRequest,
    form: web::Json<RevokeFamilyRequest>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("admin_revoke_family");

    let revoked = engine
        .revoke_family(form.family_id, &client_hints(&req))
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        family_id = %form.family_id,
        revoked = revoked,
        "Family revocation processed"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true, "revoked": revoked })))
}

/// GET /api/admin/sessions/{user_id}
///
/// List a user's active sessions. Refresh digests never serialize.
pub async fn user_sessions(
    path: web::Path<Uuid>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let sessions = engine.active_sessions(user_id).await?;

    tracing::debug!(
        user_id = %user_id,
        count = sessions.len(),
        "Active sessions listed"
    );

    Ok(HttpResponse::Ok().json(sessions))
}

/// GET /api/admin/events?limit=N
///
/// Most recent audit events, newest first. Defaults to 200 entries.
pub async fn list_events(
    query: web::Query<EventsQuery>,
    engine: web::Data<SessionEngine>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    let events = engine.recent_events(limit).await?;

    Ok(HttpResponse::Ok().json(events))
}

/// GET /api/admin/users
pub async fn list_users(engine: web::Data<SessionEngine>) -> Result<HttpResponse, AppError> {
    let users = engine.list_users().await?;

    Ok(HttpResponse::Ok().json(users))
}

/// GET /api/admin/stats
///
/// Event counts grouped by kind, as a flat `{ "KIND": count }` object.
pub async fn event_stats(engine: web::Data<SessionEngine>) -> Result<HttpResponse, AppError> {
    let stats = engine.event_stats().await?;

    let mut counts = serde_json::Map::new();
    for (kind, count) in stats {
        counts.insert(kind, serde_json::Value::from(count));
    }

    Ok(HttpResponse::Ok().json(counts))
}
