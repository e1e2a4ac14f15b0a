/// Session lifecycle engine
///
/// Orchestrates login, refresh-token rotation, reuse detection, and the
/// family revocation cascade. Every security-relevant decision appends an
/// audit event through the store; tracing output is operational only.
///
/// Token reuse is detected structurally: rotation overwrites the session
/// row's refresh digests in place and retires the old lookup digest into the
/// rotation history, so a replayed token either misses every current row and
/// resolves in history (definitive replay, family is burned) or arrives with
/// a diverged device binding (same response). Lost compare-and-swap races
/// land in the same path.

use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use uuid::Uuid;

use crate::auth::{
    device_binding_hash, AccessTokenIssuer, Claims, PasswordHasher, RateLimiter, RefreshTokenCodec,
};
use crate::configuration::TokenSettings;
use crate::error::{AppError, AuthError};
use crate::geo_client::GeoClient;
use crate::session::model::{
    Event, EventKind, NewEvent, NewSession, RefreshRotation, RequestMeta, Session, TokenBundle,
    User, UserSummary,
};
use crate::session::store::SessionStore;
use crate::validators::is_valid_username;

/// What the transport layer knows about the caller. Both fields are optional;
/// the binding digest substitutes an empty string for missing parts.
#[derive(Debug, Clone, Default)]
pub struct ClientHints {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    issuer: AccessTokenIssuer,
    password_hasher: PasswordHasher,
    refresh_codec: RefreshTokenCodec,
    limiter: RateLimiter,
    geo: Option<GeoClient>,
    tokens: TokenSettings,
}

impl SessionEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        issuer: AccessTokenIssuer,
        password_hasher: PasswordHasher,
        refresh_codec: RefreshTokenCodec,
        limiter: RateLimiter,
        geo: Option<GeoClient>,
        tokens: TokenSettings,
    ) -> Self {
        Self {
            store,
            issuer,
            password_hasher,
            refresh_codec,
            limiter,
            geo,
            tokens,
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    /// Returns validation errors for weak usernames/passwords and a unique
    /// constraint violation for duplicate usernames.
    pub async fn signup(
        &self,
        username: &str,
        password: &str,
        client: &ClientHints,
    ) -> Result<UserSummary, AppError> {
        let username = is_valid_username(username)?;
        let password_hash = self.password_hasher.hash(password)?;
        let user = self.store.create_user(&username, &password_hash).await?;

        let meta = self.request_meta(client).await;
        self.audit(NewEvent {
            kind: EventKind::UserSignup,
            user_id: Some(user.id),
            session_id: None,
            message: format!("User {} registered", user.username),
            meta,
        })
        .await?;

        tracing::info!(username = %user.username, "User registered");
        Ok(UserSummary::from(user))
    }

    /// Authenticate and open a fresh session family.
    ///
    /// Admission is rate limited per client IP before credentials are
    /// touched. Unknown username and wrong password are indistinguishable to
    /// the caller; the audit stream records which it was.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        client: &ClientHints,
    ) -> Result<TokenBundle, AppError> {
        let meta = self.request_meta(client).await;

        let rate_key = client.ip.as_deref().unwrap_or("unknown");
        if !self.limiter.admit(rate_key) {
            self.audit(NewEvent {
                kind: EventKind::LoginFailed,
                user_id: None,
                session_id: None,
                message: "Rate limited".to_string(),
                meta,
            })
            .await?;
            return Err(AuthError::RateLimited.into());
        }

        let user = match self.store.find_user_by_username(username).await? {
            Some(user) => user,
            None => {
                self.audit(NewEvent {
                    kind: EventKind::LoginFailed,
                    user_id: None,
                    session_id: None,
                    message: format!("Unknown user {}", username),
                    meta,
                })
                .await?;
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self
            .password_hasher
            .verify(password, &user.password_hash)?
        {
            self.audit(NewEvent {
                kind: EventKind::LoginFailed,
                user_id: Some(user.id),
                session_id: None,
                message: "Bad password".to_string(),
                meta,
            })
            .await?;
            return Err(AuthError::InvalidCredentials.into());
        }

        let family = self.store.create_family(user.id).await?;
        let bundle = self.open_session(&user, family.id, client).await?;

        self.audit(NewEvent {
            kind: EventKind::LoginSuccess,
            user_id: Some(user.id),
            session_id: Some(bundle.session_id),
            message: format!("Session created (family {})", family.id),
            meta,
        })
        .await?;

        tracing::info!(
            username = %user.username,
            family_id = %family.id,
            "Login succeeded"
        );
        Ok(bundle)
    }

    /// Rotate a refresh token, detecting replay and binding divergence.
    ///
    /// Check order: current-row lookup, at-rest verification, device binding,
    /// refresh expiry, compare-and-swap rotation. Binding divergence and
    /// replay of a rotated-away token both revoke the entire family.
    pub async fn refresh(
        &self,
        raw_token: &str,
        client: &ClientHints,
    ) -> Result<TokenBundle, AppError> {
        let lookup = self.refresh_codec.lookup_hash(raw_token);
        let meta = self.request_meta(client).await;

        let session = match self.store.find_session_by_lookup_hash(&lookup).await? {
            Some(session) => session,
            None => return self.reject_unmatched_token(&lookup, meta).await,
        };

        if !session.is_active() || !self.family_is_trusted(session.family_id).await? {
            self.audit(NewEvent {
                kind: EventKind::TokenReuseDetected,
                user_id: Some(session.user_id),
                session_id: Some(session.id),
                message: "Unknown or revoked refresh token used".to_string(),
                meta,
            })
            .await?;
            return Err(AuthError::TokenInvalid.into());
        }

        if !self
            .refresh_codec
            .verify(raw_token, &session.refresh_at_rest_hash)?
        {
            self.audit(NewEvent {
                kind: EventKind::TokenReuseDetected,
                user_id: Some(session.user_id),
                session_id: Some(session.id),
                message: "Refresh token hash matched, verify failed".to_string(),
                meta,
            })
            .await?;
            return Err(AuthError::TokenInvalid.into());
        }

        let presented_binding =
            device_binding_hash(client.user_agent.as_deref(), client.ip.as_deref());
        if let Some(stored_binding) = &session.user_agent_hash {
            if stored_binding != &presented_binding {
                self.burn_family(session.family_id).await?;
                self.audit(NewEvent {
                    kind: EventKind::TokenReuseDetected,
                    user_id: Some(session.user_id),
                    session_id: Some(session.id),
                    message: "Binding mismatch, family revoked".to_string(),
                    meta,
                })
                .await?;
                tracing::warn!(
                    family_id = %session.family_id,
                    session_id = %session.id,
                    "Binding mismatch, family revoked"
                );
                return Err(AuthError::TokenReused.into());
            }
        }

        if session.refresh_expired() {
            self.audit(NewEvent {
                kind: EventKind::TokenReuseDetected,
                user_id: Some(session.user_id),
                session_id: Some(session.id),
                message: "Expired refresh token used".to_string(),
                meta,
            })
            .await?;
            return Err(AuthError::TokenExpired.into());
        }

        let user = self
            .store
            .find_user_by_id(session.user_id)
            .await?
            .ok_or_else(|| AppError::Internal("Session owner not found".to_string()))?;

        let access = self
            .issuer
            .sign(user.id, &user.username, self.tokens.access_ttl_secs)?;
        let next_refresh = self.refresh_codec.generate()?;
        let refresh_expires_at = Utc::now() + Duration::seconds(self.tokens.refresh_ttl_secs);

        let rotated = self
            .store
            .update_session_refresh(
                session.id,
                RefreshRotation {
                    expected_lookup_hash: session.refresh_lookup_hash.clone(),
                    access_jti: access.jti.clone(),
                    access_expires_at: access.expires_at,
                    refresh_lookup_hash: next_refresh.lookup_hash.clone(),
                    refresh_at_rest_hash: next_refresh.at_rest_hash.clone(),
                    refresh_expires_at,
                },
            )
            .await?;
        if !rotated {
            // Lost the swap: a concurrent presenter of the same token just
            // rotated this row, so our digest is now retired.
            return self.reject_unmatched_token(&lookup, meta).await;
        }

        self.audit(NewEvent {
            kind: EventKind::Refresh,
            user_id: Some(session.user_id),
            session_id: Some(session.id),
            message: "Refresh token rotated".to_string(),
            meta,
        })
        .await?;

        tracing::info!(
            session_id = %session.id,
            family_id = %session.family_id,
            "Refresh token rotated"
        );
        Ok(TokenBundle {
            access_token: access.token,
            access_expires_at: rfc3339(access.expires_at),
            refresh_token: next_refresh.raw,
            refresh_expires_at: rfc3339(refresh_expires_at),
            session_id: session.id,
            family_id: session.family_id,
        })
    }

    /// Administrative session revocation. Idempotent; returns whether this
    /// call performed the transition.
    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        client: &ClientHints,
    ) -> Result<bool, AppError> {
        let revoked = self.store.revoke_session(session_id).await?;
        if revoked {
            let meta = self.request_meta(client).await;
            self.audit(NewEvent {
                kind: EventKind::SessionRevoked,
                user_id: None,
                session_id: Some(session_id),
                message: "Revoked by admin".to_string(),
                meta,
            })
            .await?;
            tracing::info!(session_id = %session_id, "Session revoked");
        }
        Ok(revoked)
    }

    /// Administrative family revocation: compromise the family and revoke
    /// every session under it. Idempotent.
    pub async fn revoke_family(
        &self,
        family_id: Uuid,
        client: &ClientHints,
    ) -> Result<bool, AppError> {
        let newly_compromised = self.store.mark_family_compromised(family_id).await?;
        let sessions_revoked = self.store.revoke_sessions_in_family(family_id).await?;

        let transitioned = newly_compromised || sessions_revoked > 0;
        if transitioned {
            let meta = self.request_meta(client).await;
            self.audit(NewEvent {
                kind: EventKind::FamilyRevoked,
                user_id: None,
                session_id: None,
                message: format!("Family {} revoked by admin", family_id),
                meta,
            })
            .await?;
            tracing::info!(
                family_id = %family_id,
                sessions_revoked = sessions_revoked,
                "Family revoked"
            );
        }
        Ok(transitioned)
    }

    /// Validate an access token and return its claims.
    pub fn verify_access(&self, token: &str) -> Result<Claims, AppError> {
        self.issuer.verify(token)
    }

    pub async fn find_user(&self, user_id: Uuid) -> Result<Option<UserSummary>, AppError> {
        Ok(self
            .store
            .find_user_by_id(user_id)
            .await?
            .map(UserSummary::from))
    }

    pub async fn active_sessions(&self, user_id: Uuid) -> Result<Vec<Session>, AppError> {
        Ok(self.store.list_active_sessions_for_user(user_id).await?)
    }

    pub async fn recent_events(&self, limit: i64) -> Result<Vec<Event>, AppError> {
        Ok(self.store.list_events(limit).await?)
    }

    pub async fn list_users(&self) -> Result<Vec<UserSummary>, AppError> {
        Ok(self.store.list_users().await?)
    }

    pub async fn event_stats(&self) -> Result<Vec<(String, i64)>, AppError> {
        Ok(self.store.count_events_by_kind().await?)
    }

    /// Mint a token pair and persist the session row for a fresh family.
    async fn open_session(
        &self,
        user: &User,
        family_id: Uuid,
        client: &ClientHints,
    ) -> Result<TokenBundle, AppError> {
        let access = self
            .issuer
            .sign(user.id, &user.username, self.tokens.access_ttl_secs)?;
        let refresh = self.refresh_codec.generate()?;
        let refresh_expires_at = Utc::now() + Duration::seconds(self.tokens.refresh_ttl_secs);

        let binding = device_binding_hash(client.user_agent.as_deref(), client.ip.as_deref());
        let session = self
            .store
            .create_session(NewSession {
                family_id,
                user_id: user.id,
                access_jti: access.jti.clone(),
                access_expires_at: access.expires_at,
                refresh_lookup_hash: refresh.lookup_hash.clone(),
                refresh_at_rest_hash: refresh.at_rest_hash.clone(),
                refresh_expires_at,
                user_agent_hash: Some(binding.clone()),
                ip_hash: Some(binding),
            })
            .await?;

        Ok(TokenBundle {
            access_token: access.token,
            access_expires_at: rfc3339(access.expires_at),
            refresh_token: refresh.raw,
            refresh_expires_at: rfc3339(refresh_expires_at),
            session_id: session.id,
            family_id,
        })
    }

    /// A presented digest with no current row: either a retired digest
    /// (definitive replay of a rotated token, burn the family) or a token
    /// this store has never seen.
    async fn reject_unmatched_token(
        &self,
        lookup_hash: &str,
        meta: Option<RequestMeta>,
    ) -> Result<TokenBundle, AppError> {
        if let Some(record) = self.store.find_rotation_record(lookup_hash).await? {
            self.burn_family(record.family_id).await?;
            self.audit(NewEvent {
                kind: EventKind::TokenReuseDetected,
                user_id: Some(record.user_id),
                session_id: Some(record.session_id),
                message: "Stale refresh token replayed, family revoked".to_string(),
                meta,
            })
            .await?;
            tracing::warn!(
                family_id = %record.family_id,
                session_id = %record.session_id,
                "Stale refresh token replayed, family revoked"
            );
            return Err(AuthError::TokenReused.into());
        }

        self.audit(NewEvent {
            kind: EventKind::TokenReuseDetected,
            user_id: None,
            session_id: None,
            message: "Unknown or revoked refresh token used".to_string(),
            meta,
        })
        .await?;
        Err(AuthError::TokenInvalid.into())
    }

    async fn burn_family(&self, family_id: Uuid) -> Result<(), AppError> {
        self.store.mark_family_compromised(family_id).await?;
        self.store.revoke_sessions_in_family(family_id).await?;
        Ok(())
    }

    async fn family_is_trusted(&self, family_id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .store
            .find_family(family_id)
            .await?
            .map(|f| f.is_trusted())
            .unwrap_or(false))
    }

    /// Audit appends are not best-effort: a store that cannot record
    /// security events must fail the request.
    async fn audit(&self, event: NewEvent) -> Result<(), AppError> {
        Ok(self.store.append_event(event).await?)
    }

    async fn request_meta(&self, client: &ClientHints) -> Option<RequestMeta> {
        let ip = client.ip.clone()?;
        match &self.geo {
            Some(geo) => Some(geo.lookup(&ip).await),
            None => Some(RequestMeta::from_ip(ip)),
        }
    }
}

fn rfc3339(instant: chrono::DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SigningKeypair;
    use crate::configuration::{ArgonSettings, RateLimitSettings};
    use crate::error::StoreError;
    use crate::session::memory::MemoryStore;

    fn argon_test_params() -> ArgonSettings {
        ArgonSettings {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }

    fn default_tokens() -> TokenSettings {
        TokenSettings {
            issuer: "session-hardener-test".to_string(),
            access_ttl_secs: 300,
            refresh_ttl_secs: 604_800,
        }
    }

    fn default_rate() -> RateLimitSettings {
        RateLimitSettings {
            capacity: 10,
            refill_per_sec: 0.2,
        }
    }

    fn build_engine(
        store: Arc<MemoryStore>,
        tokens: TokenSettings,
        rate: RateLimitSettings,
    ) -> SessionEngine {
        let keys = SigningKeypair::generate().unwrap();
        let issuer = AccessTokenIssuer::new(keys, tokens.issuer.clone());
        let hasher = PasswordHasher::new(&argon_test_params()).unwrap();
        let codec = RefreshTokenCodec::new(&argon_test_params()).unwrap();
        let limiter = RateLimiter::new(&rate);
        SessionEngine::new(store, issuer, hasher, codec, limiter, None, tokens)
    }

    fn test_engine() -> (SessionEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = build_engine(store.clone(), default_tokens(), default_rate());
        (engine, store)
    }

    fn hints(user_agent: &str, ip: &str) -> ClientHints {
        ClientHints {
            ip: Some(ip.to_string()),
            user_agent: Some(user_agent.to_string()),
        }
    }

    async fn register_alice(engine: &SessionEngine) {
        engine
            .signup("alice", "Password123", &hints("test-agent", "198.51.100.7"))
            .await
            .unwrap();
    }

    async fn event_messages(engine: &SessionEngine, kind: &str) -> Vec<String> {
        engine
            .recent_events(100)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.message)
            .collect()
    }

    #[tokio::test]
    async fn test_signup_persists_user_and_emits_event() {
        let (engine, _) = test_engine();
        register_alice(&engine).await;

        let users = engine.list_users().await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "alice");

        let messages = event_messages(&engine, "USER_SIGNUP").await;
        assert_eq!(messages, vec!["User alice registered".to_string()]);
    }

    #[tokio::test]
    async fn test_signup_duplicate_username_conflicts() {
        let (engine, _) = test_engine();
        register_alice(&engine).await;

        let result = engine
            .signup("alice", "Password456", &hints("test-agent", "198.51.100.7"))
            .await;
        assert!(matches!(
            result,
            Err(AppError::Store(StoreError::UniqueConstraintViolation(_)))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_generic_but_audited() {
        let (engine, _) = test_engine();
        register_alice(&engine).await;
        let client = hints("test-agent", "198.51.100.7");

        let unknown = engine.login("mallory", "Password123", &client).await;
        assert!(matches!(
            unknown,
            Err(AppError::Auth(AuthError::InvalidCredentials))
        ));

        let bad_password = engine.login("alice", "WrongPass99", &client).await;
        assert!(matches!(
            bad_password,
            Err(AppError::Auth(AuthError::InvalidCredentials))
        ));

        let messages = event_messages(&engine, "LOGIN_FAILED").await;
        assert!(messages.contains(&"Unknown user mallory".to_string()));
        assert!(messages.contains(&"Bad password".to_string()));
    }

    #[tokio::test]
    async fn test_login_bundle_resolves_to_active_trusted_session() {
        let (engine, store) = test_engine();
        register_alice(&engine).await;
        let client = hints("test-agent", "198.51.100.7");

        let bundle = engine.login("alice", "Password123", &client).await.unwrap();

        // Recompute the lookup digest independently and resolve the row
        let codec = RefreshTokenCodec::new(&argon_test_params()).unwrap();
        let session = store
            .find_session_by_lookup_hash(&codec.lookup_hash(&bundle.refresh_token))
            .await
            .unwrap()
            .expect("bundle must resolve to a session row");
        assert_eq!(session.id, bundle.session_id);
        assert_eq!(session.family_id, bundle.family_id);
        assert!(session.is_active());

        let family = store
            .find_family(session.family_id)
            .await
            .unwrap()
            .expect("family must exist");
        assert!(family.is_trusted());

        // The access token verifies and names the same user
        let claims = engine.verify_access(&bundle.access_token).unwrap();
        assert_eq!(claims.user_id().unwrap(), session.user_id);
        assert_eq!(claims.username, "alice");
    }

    #[tokio::test]
    async fn test_refresh_rotates_row_in_place() {
        let (engine, store) = test_engine();
        register_alice(&engine).await;
        let client = hints("test-agent", "198.51.100.7");

        let first = engine.login("alice", "Password123", &client).await.unwrap();
        let second = engine.refresh(&first.refresh_token, &client).await.unwrap();

        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.family_id, first.family_id);
        assert_ne!(second.refresh_token, first.refresh_token);
        assert_ne!(second.access_token, first.access_token);

        let codec = RefreshTokenCodec::new(&argon_test_params()).unwrap();
        assert!(store
            .find_session_by_lookup_hash(&codec.lookup_hash(&first.refresh_token))
            .await
            .unwrap()
            .is_none());
        let row = store
            .find_session_by_lookup_hash(&codec.lookup_hash(&second.refresh_token))
            .await
            .unwrap()
            .expect("rotated digest must resolve");
        assert_eq!(row.id, first.session_id);

        let messages = event_messages(&engine, "REFRESH").await;
        assert_eq!(messages, vec!["Refresh token rotated".to_string()]);
    }

    #[tokio::test]
    async fn test_replaying_rotated_token_burns_the_family() {
        let (engine, store) = test_engine();
        register_alice(&engine).await;
        let client = hints("test-agent", "198.51.100.7");

        let first = engine.login("alice", "Password123", &client).await.unwrap();
        let _second = engine.refresh(&first.refresh_token, &client).await.unwrap();

        // Replay the rotated-away token
        let replay = engine.refresh(&first.refresh_token, &client).await;
        assert!(matches!(replay, Err(AppError::Auth(AuthError::TokenReused))));

        let family = store
            .find_family(first.family_id)
            .await
            .unwrap()
            .expect("family must exist");
        assert!(!family.is_trusted());

        let users = engine.list_users().await.unwrap();
        let active = engine.active_sessions(users[0].id).await.unwrap();
        assert!(active.is_empty());

        let messages = event_messages(&engine, "TOKEN_REUSE_DETECTED").await;
        assert!(messages.contains(&"Stale refresh token replayed, family revoked".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_refresh_token_rejected_without_cascade() {
        let (engine, _) = test_engine();
        let client = hints("test-agent", "198.51.100.7");

        let result = engine.refresh("never-issued-token", &client).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::TokenInvalid))));

        let messages = event_messages(&engine, "TOKEN_REUSE_DETECTED").await;
        assert_eq!(
            messages,
            vec!["Unknown or revoked refresh token used".to_string()]
        );
    }

    #[tokio::test]
    async fn test_binding_divergence_burns_the_family() {
        let (engine, store) = test_engine();
        register_alice(&engine).await;

        let original_device = hints("test-agent", "198.51.100.7");
        let bundle = engine
            .login("alice", "Password123", &original_device)
            .await
            .unwrap();

        // Same token, different device and network
        let other_device = hints("other-agent", "203.0.113.99");
        let result = engine.refresh(&bundle.refresh_token, &other_device).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::TokenReused))));

        let family = store
            .find_family(bundle.family_id)
            .await
            .unwrap()
            .expect("family must exist");
        assert!(!family.is_trusted());

        let users = engine.list_users().await.unwrap();
        assert!(engine.active_sessions(users[0].id).await.unwrap().is_empty());

        let messages = event_messages(&engine, "TOKEN_REUSE_DETECTED").await;
        assert!(messages.contains(&"Binding mismatch, family revoked".to_string()));
    }

    #[tokio::test]
    async fn test_revoked_session_token_rejected_without_new_cascade() {
        let (engine, store) = test_engine();
        register_alice(&engine).await;
        let client = hints("test-agent", "198.51.100.7");

        let bundle = engine.login("alice", "Password123", &client).await.unwrap();
        assert!(engine.revoke_session(bundle.session_id, &client).await.unwrap());

        let result = engine.refresh(&bundle.refresh_token, &client).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::TokenInvalid))));

        // Individual revocation does not compromise the family
        let family = store
            .find_family(bundle.family_id)
            .await
            .unwrap()
            .expect("family must exist");
        assert!(family.is_trusted());
    }

    #[tokio::test]
    async fn test_expired_refresh_token_rejected_without_cascade() {
        let store = Arc::new(MemoryStore::new());
        let mut tokens = default_tokens();
        tokens.refresh_ttl_secs = -30;
        let engine = build_engine(store.clone(), tokens, default_rate());

        register_alice(&engine).await;
        let client = hints("test-agent", "198.51.100.7");
        let bundle = engine.login("alice", "Password123", &client).await.unwrap();

        let result = engine.refresh(&bundle.refresh_token, &client).await;
        assert!(matches!(result, Err(AppError::Auth(AuthError::TokenExpired))));

        // Expiry is not a reuse signal
        let family = store
            .find_family(bundle.family_id)
            .await
            .unwrap()
            .expect("family must exist");
        assert!(family.is_trusted());

        let messages = event_messages(&engine, "TOKEN_REUSE_DETECTED").await;
        assert_eq!(messages, vec!["Expired refresh token used".to_string()]);
    }

    #[tokio::test]
    async fn test_admin_revocations_are_idempotent() {
        let (engine, _) = test_engine();
        register_alice(&engine).await;
        let client = hints("test-agent", "198.51.100.7");
        let bundle = engine.login("alice", "Password123", &client).await.unwrap();

        assert!(engine.revoke_session(bundle.session_id, &client).await.unwrap());
        assert!(!engine.revoke_session(bundle.session_id, &client).await.unwrap());
        assert_eq!(event_messages(&engine, "SESSION_REVOKED").await.len(), 1);

        assert!(engine.revoke_family(bundle.family_id, &client).await.unwrap());
        assert!(!engine.revoke_family(bundle.family_id, &client).await.unwrap());
        assert_eq!(event_messages(&engine, "FAMILY_REVOKED").await.len(), 1);
    }

    #[tokio::test]
    async fn test_login_is_rate_limited_per_ip() {
        let store = Arc::new(MemoryStore::new());
        let rate = RateLimitSettings {
            capacity: 1,
            refill_per_sec: 0.2,
        };
        let engine = build_engine(store, default_tokens(), rate);
        register_alice(&engine).await;
        let client = hints("test-agent", "198.51.100.7");

        engine.login("alice", "Password123", &client).await.unwrap();

        let second = engine.login("alice", "Password123", &client).await;
        assert!(matches!(second, Err(AppError::Auth(AuthError::RateLimited))));

        let messages = event_messages(&engine, "LOGIN_FAILED").await;
        assert_eq!(messages, vec!["Rate limited".to_string()]);

        // A different client IP has its own bucket
        let other = hints("test-agent", "203.0.113.50");
        engine.login("alice", "Password123", &other).await.unwrap();
    }
}
