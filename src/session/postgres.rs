/// Postgres-backed session store
///
/// All conditional state transitions (rotation, revocation) are expressed as
/// single UPDATE statements guarded by WHERE clauses, so concurrent callers
/// race on the database row itself and at most one of them observes
/// `rows_affected() == 1`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::model::{
    Event, NewEvent, NewSession, RefreshRotation, RotationRecord, Session, SessionFamily, User,
    UserSummary,
};
use crate::session::store::SessionStore;

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations from the `migrations/` directory.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::QueryExecution(format!("Migration failed: {}", e)))
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let users = sqlx::query_as::<_, UserSummary>(
            r#"
            SELECT id, username, created_at
            FROM users
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn create_family(&self, user_id: Uuid) -> Result<SessionFamily, StoreError> {
        let family = SessionFamily {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
            compromised_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO session_families (id, user_id, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(family.id)
        .bind(family.user_id)
        .bind(family.created_at)
        .execute(&self.pool)
        .await?;

        Ok(family)
    }

    async fn find_family(&self, family_id: Uuid) -> Result<Option<SessionFamily>, StoreError> {
        let family = sqlx::query_as::<_, SessionFamily>(
            r#"
            SELECT id, user_id, created_at, compromised_at
            FROM session_families
            WHERE id = $1
            "#,
        )
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(family)
    }

    async fn mark_family_compromised(&self, family_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE session_families
            SET compromised_at = $2
            WHERE id = $1 AND compromised_at IS NULL
            "#,
        )
        .bind(family_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn revoke_sessions_in_family(&self, family_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = $2
            WHERE family_id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(family_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn create_session(&self, new_session: NewSession) -> Result<Session, StoreError> {
        let session = Session {
            id: Uuid::new_v4(),
            family_id: new_session.family_id,
            user_id: new_session.user_id,
            access_jti: new_session.access_jti,
            access_expires_at: new_session.access_expires_at,
            refresh_lookup_hash: new_session.refresh_lookup_hash,
            refresh_at_rest_hash: new_session.refresh_at_rest_hash,
            refresh_expires_at: new_session.refresh_expires_at,
            user_agent_hash: new_session.user_agent_hash,
            ip_hash: new_session.ip_hash,
            created_at: Utc::now(),
            revoked_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, family_id, user_id, access_jti, access_expires_at,
                refresh_lookup_hash, refresh_at_rest_hash, refresh_expires_at,
                user_agent_hash, ip_hash, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(session.id)
        .bind(session.family_id)
        .bind(session.user_id)
        .bind(&session.access_jti)
        .bind(session.access_expires_at)
        .bind(&session.refresh_lookup_hash)
        .bind(&session.refresh_at_rest_hash)
        .bind(session.refresh_expires_at)
        .bind(&session.user_agent_hash)
        .bind(&session.ip_hash)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    async fn find_session_by_lookup_hash(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, family_id, user_id, access_jti, access_expires_at,
                   refresh_lookup_hash, refresh_at_rest_hash, refresh_expires_at,
                   user_agent_hash, ip_hash, created_at, revoked_at
            FROM sessions
            WHERE refresh_lookup_hash = $1
            "#,
        )
        .bind(lookup_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn update_session_refresh(
        &self,
        session_id: Uuid,
        rotation: RefreshRotation,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET access_jti = $1,
                access_expires_at = $2,
                refresh_lookup_hash = $3,
                refresh_at_rest_hash = $4,
                refresh_expires_at = $5
            WHERE id = $6 AND refresh_lookup_hash = $7 AND revoked_at IS NULL
            "#,
        )
        .bind(&rotation.access_jti)
        .bind(rotation.access_expires_at)
        .bind(&rotation.refresh_lookup_hash)
        .bind(&rotation.refresh_at_rest_hash)
        .bind(rotation.refresh_expires_at)
        .bind(session_id)
        .bind(&rotation.expected_lookup_hash)
        .execute(&mut tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        // Retire the replaced digest in the same transaction as the swap
        sqlx::query(
            r#"
            INSERT INTO rotation_history (id, lookup_hash, session_id, family_id, user_id, rotated_at)
            SELECT $1, $2, s.id, s.family_id, s.user_id, $3
            FROM sessions s
            WHERE s.id = $4
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&rotation.expected_lookup_hash)
        .bind(Utc::now())
        .bind(session_id)
        .execute(&mut tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn find_rotation_record(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<RotationRecord>, StoreError> {
        let record = sqlx::query_as::<_, RotationRecord>(
            r#"
            SELECT lookup_hash, session_id, family_id, user_id, rotated_at
            FROM rotation_history
            WHERE lookup_hash = $1
            "#,
        )
        .bind(lookup_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = $2
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_active_sessions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Session>, StoreError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, family_id, user_id, access_jti, access_expires_at,
                   refresh_lookup_hash, refresh_at_rest_hash, refresh_expires_at,
                   user_agent_hash, ip_hash, created_at, revoked_at
            FROM sessions
            WHERE user_id = $1 AND revoked_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn append_event(&self, event: NewEvent) -> Result<(), StoreError> {
        let meta = event.meta;

        sqlx::query(
            r#"
            INSERT INTO events (
                id, kind, user_id, session_id, message,
                ip, country, country_code, city, isp, latitude, longitude,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.kind.as_str())
        .bind(event.user_id)
        .bind(event.session_id)
        .bind(&event.message)
        .bind(meta.as_ref().and_then(|m| m.ip.clone()))
        .bind(meta.as_ref().and_then(|m| m.country.clone()))
        .bind(meta.as_ref().and_then(|m| m.country_code.clone()))
        .bind(meta.as_ref().and_then(|m| m.city.clone()))
        .bind(meta.as_ref().and_then(|m| m.isp.clone()))
        .bind(meta.as_ref().and_then(|m| m.latitude))
        .bind(meta.as_ref().and_then(|m| m.longitude))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_events(&self, limit: i64) -> Result<Vec<Event>, StoreError> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, kind, user_id, session_id, message,
                   ip, country, country_code, city, isp, latitude, longitude,
                   created_at
            FROM events
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn count_events_by_kind(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let counts = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT kind, COUNT(*)
            FROM events
            GROUP BY kind
            ORDER BY kind
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }
}
