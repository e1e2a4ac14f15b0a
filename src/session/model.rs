/// Session domain model
///
/// Typed rows for users, session families, sessions, and audit events,
/// plus the wire-facing token bundle. Refresh digests never serialize.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Account row. The password hash stays server-side; use [`UserSummary`]
/// for anything wire-facing.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Wire-safe projection of a user.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        }
    }
}

/// Trust unit grouping every session descended from one login.
/// Compromise is one-way; a compromised family never readmits a refresh.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionFamily {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub compromised_at: Option<DateTime<Utc>>,
}

impl SessionFamily {
    pub fn is_trusted(&self) -> bool {
        self.compromised_at.is_none()
    }
}

/// One credential pair. Rotation overwrites the refresh columns of this row
/// in place; a session never grows successor rows.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub family_id: Uuid,
    pub user_id: Uuid,
    pub access_jti: String,
    pub access_expires_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub refresh_lookup_hash: String,
    #[serde(skip_serializing)]
    pub refresh_at_rest_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub user_agent_hash: Option<String>,
    pub ip_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    pub fn refresh_expired(&self) -> bool {
        self.refresh_expires_at <= Utc::now()
    }
}

/// Insert payload for a new session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub family_id: Uuid,
    pub user_id: Uuid,
    pub access_jti: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_lookup_hash: String,
    pub refresh_at_rest_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub user_agent_hash: Option<String>,
    pub ip_hash: Option<String>,
}

/// Compare-and-swap payload for in-place rotation. The update only lands if
/// the row still carries `expected_lookup_hash` and is un-revoked.
#[derive(Debug, Clone)]
pub struct RefreshRotation {
    pub expected_lookup_hash: String,
    pub access_jti: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_lookup_hash: String,
    pub refresh_at_rest_hash: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Append-only record of a lookup hash retired by rotation.
///
/// Rotation overwrites the session row in place, so a replayed old token no
/// longer matches any current row. This table is what turns that dead end
/// into a definitive reuse signal: the retired hash still resolves here, and
/// carries enough context to revoke the whole family.
#[derive(Debug, Clone, FromRow)]
pub struct RotationRecord {
    pub lookup_hash: String,
    pub session_id: Uuid,
    pub family_id: Uuid,
    pub user_id: Uuid,
    pub rotated_at: DateTime<Utc>,
}

/// Audit event taxonomy. Exhaustive: the stats endpoint groups by these
/// strings and the dashboard of the day filters on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LoginSuccess,
    LoginFailed,
    Refresh,
    TokenReuseDetected,
    FamilyRevoked,
    SessionRevoked,
    UserSignup,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LoginSuccess => "LOGIN_SUCCESS",
            EventKind::LoginFailed => "LOGIN_FAILED",
            EventKind::Refresh => "REFRESH",
            EventKind::TokenReuseDetected => "TOKEN_REUSE_DETECTED",
            EventKind::FamilyRevoked => "FAMILY_REVOKED",
            EventKind::SessionRevoked => "SESSION_REVOKED",
            EventKind::UserSignup => "USER_SIGNUP",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional request metadata attached to audit events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl RequestMeta {
    /// Metadata carrying only the client IP, no geolocation.
    pub fn from_ip(ip: String) -> Self {
        Self {
            ip: Some(ip),
            country: None,
            country_code: None,
            city: None,
            isp: None,
            latitude: None,
            longitude: None,
        }
    }
}

/// Audit stream row. `kind` holds an [`EventKind`] string.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub kind: String,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub message: String,
    pub ip: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Append payload for the audit stream.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub kind: EventKind,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
    pub message: String,
    pub meta: Option<RequestMeta>,
}

/// Credential pair returned to callers on login and refresh.
/// Expiries are RFC 3339 strings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub access_token: String,
    pub access_expires_at: String,
    pub refresh_token: String,
    pub refresh_expires_at: String,
    pub session_id: Uuid,
    pub family_id: Uuid,
}
