/// In-process session store
///
/// A single mutex over plain maps, mirroring the Postgres store's semantics
/// (unique usernames, unique refresh lookup digests, CAS rotation,
/// conditional revocation). The test suites run the full engine against this
/// implementation; nothing here is test-only code, it is just a backend.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::model::{
    Event, NewEvent, NewSession, RefreshRotation, RotationRecord, Session, SessionFamily, User,
    UserSummary,
};
use crate::session::store::SessionStore;

#[derive(Default)]
struct State {
    users: Vec<User>,
    families: HashMap<Uuid, SessionFamily>,
    sessions: HashMap<Uuid, Session>,
    rotations: Vec<RotationRecord>,
    events: Vec<Event>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let mut state = self.state.lock().unwrap();

        if state.users.iter().any(|u| u.username == username) {
            return Err(StoreError::UniqueConstraintViolation(
                "Username already registered".to_string(),
            ));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserSummary>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().cloned().map(UserSummary::from).collect())
    }

    async fn create_family(&self, user_id: Uuid) -> Result<SessionFamily, StoreError> {
        let mut state = self.state.lock().unwrap();

        let family = SessionFamily {
            id: Uuid::new_v4(),
            user_id,
            created_at: Utc::now(),
            compromised_at: None,
        };
        state.families.insert(family.id, family.clone());
        Ok(family)
    }

    async fn find_family(&self, family_id: Uuid) -> Result<Option<SessionFamily>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.families.get(&family_id).cloned())
    }

    async fn mark_family_compromised(&self, family_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();

        match state.families.get_mut(&family_id) {
            Some(family) if family.compromised_at.is_none() => {
                family.compromised_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_sessions_in_family(&self, family_id: Uuid) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        let mut revoked = 0;
        for session in state.sessions.values_mut() {
            if session.family_id == family_id && session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn create_session(&self, new_session: NewSession) -> Result<Session, StoreError> {
        let mut state = self.state.lock().unwrap();

        if state
            .sessions
            .values()
            .any(|s| s.refresh_lookup_hash == new_session.refresh_lookup_hash)
        {
            return Err(StoreError::UniqueConstraintViolation(
                "refresh_lookup_hash".to_string(),
            ));
        }

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
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session_by_lookup_hash(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<Session>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sessions
            .values()
            .find(|s| s.refresh_lookup_hash == lookup_hash)
            .cloned())
    }

    async fn update_session_refresh(
        &self,
        session_id: Uuid,
        rotation: RefreshRotation,
    ) -> Result<bool, StoreError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let session = match state.sessions.get_mut(&session_id) {
            Some(s)
                if s.refresh_lookup_hash == rotation.expected_lookup_hash
                    && s.revoked_at.is_none() =>
            {
                s
            }
            _ => return Ok(false),
        };

        state.rotations.push(RotationRecord {
            lookup_hash: session.refresh_lookup_hash.clone(),
            session_id: session.id,
            family_id: session.family_id,
            user_id: session.user_id,
            rotated_at: Utc::now(),
        });
        session.access_jti = rotation.access_jti;
        session.access_expires_at = rotation.access_expires_at;
        session.refresh_lookup_hash = rotation.refresh_lookup_hash;
        session.refresh_at_rest_hash = rotation.refresh_at_rest_hash;
        session.refresh_expires_at = rotation.refresh_expires_at;
        Ok(true)
    }

    async fn find_rotation_record(
        &self,
        lookup_hash: &str,
    ) -> Result<Option<RotationRecord>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .rotations
            .iter()
            .find(|r| r.lookup_hash == lookup_hash)
            .cloned())
    }

    async fn revoke_session(&self, session_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();

        match state.sessions.get_mut(&session_id) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active_sessions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Session>, StoreError> {
        let state = self.state.lock().unwrap();

        let mut sessions: Vec<Session> = state
            .sessions
            .values()
            .filter(|s| s.user_id == user_id && s.revoked_at.is_none())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn append_event(&self, event: NewEvent) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();

        let meta = event.meta;
        state.events.push(Event {
            id: Uuid::new_v4(),
            kind: event.kind.as_str().to_string(),
            user_id: event.user_id,
            session_id: event.session_id,
            message: event.message,
            ip: meta.as_ref().and_then(|m| m.ip.clone()),
            country: meta.as_ref().and_then(|m| m.country.clone()),
            country_code: meta.as_ref().and_then(|m| m.country_code.clone()),
            city: meta.as_ref().and_then(|m| m.city.clone()),
            isp: meta.as_ref().and_then(|m| m.isp.clone()),
            latitude: meta.as_ref().and_then(|m| m.latitude),
            longitude: meta.as_ref().and_then(|m| m.longitude),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_events(&self, limit: i64) -> Result<Vec<Event>, StoreError> {
        let state = self.state.lock().unwrap();

        let limit = limit.max(0) as usize;
        Ok(state.events.iter().rev().take(limit).cloned().collect())
    }

    async fn count_events_by_kind(&self) -> Result<Vec<(String, i64)>, StoreError> {
        let state = self.state.lock().unwrap();

        let mut counts: HashMap<String, i64> = HashMap::new();
        for event in &state.events {
            *counts.entry(event.kind.clone()).or_insert(0) += 1;
        }

        let mut counts: Vec<(String, i64)> = counts.into_iter().collect();
        counts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(counts)
    }
}
