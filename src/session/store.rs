/// Session Store interface
///
/// The persistence seam of the engine. Two implementations exist: Postgres
/// for deployment and an in-process map store for tests. Both honor the same
/// compare-and-swap contract for rotation and the same conditional-update
/// contract for revocation, so the engine's concurrency story does not depend
/// on the backend.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::model::{
    Event, NewEvent, NewSession, RefreshRotation, RotationRecord, Session, SessionFamily, User,
    UserSummary,
};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a user; the username is unique.
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError>;

    /// Open a new TRUSTED family for a user.
    async fn create_family(&self, user_id: Uuid) -> Result<SessionFamily, StoreError>;

    async fn find_family(&self, family_id: Uuid) -> Result<Option<SessionFamily>, StoreError>;

    /// One-way compromise transition. Returns `true` only when this call
    /// performed the transition.
    async fn mark_family_compromised(&self, family_id: Uuid) -> Result<bool, StoreError>;

    /// Revoke every un-revoked session in the family. Returns the number of
    /// rows that transitioned.
    async fn revoke_sessions_in_family(&self, family_id: Uuid) -> Result<u64, StoreError>;

    async fn create_session(&self, new_session: NewSession) -> Result<Session, StoreError>;

    async fn find_session_by_lookup_hash(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<Session>, StoreError>;

    /// In-place rotation, compare-and-swap keyed on the row's current
    /// refresh lookup digest and un-revoked state. Returns `false` when the
    /// row was concurrently rotated or revoked; the caller treats that as a
    /// reuse signal. A winning swap also retires the replaced lookup digest
    /// into the rotation history, atomically with the swap.
    async fn update_session_refresh(
        &self,
        session_id: Uuid,
        rotation: RefreshRotation,
    ) -> Result<bool, StoreError>;

    /// Resolve a lookup digest that no longer matches any current session
    /// row. A hit means the digest was rotated away, which makes any later
    /// presentation of its token a definitive replay.
    async fn find_rotation_record(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<RotationRecord>, StoreError>;

    /// Set `revoked_at` if unset. Returns `true` only on actual transition;
    /// repeat calls are no-ops.
    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, StoreError>;

    async fn list_active_sessions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Session>, StoreError>;

    async fn append_event(&self, event: NewEvent) -> Result<(), StoreError>;

    /// Newest first, up to `limit`.
    async fn list_events(&self, limit: i64) -> Result<Vec<Event>, StoreError>;

    /// Event counts grouped by kind, kind-sorted.
    async fn count_events_by_kind(&self) -> Result<Vec<(String, i64)>, StoreError>;
}
