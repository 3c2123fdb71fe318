use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::gate::SessionState;
use super::principal::UserContext;
use crate::error::{AppError, AppResult};

pub type SessionToken = String;

#[derive(Debug, Clone)]
pub struct Session {
    pub token: SessionToken,
    pub user: UserContext,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The "current user" collaborator consulted by gates and handlers.
pub trait SessionSource: Send + Sync {
    fn lookup(&self, token: &str) -> SessionState;
}

#[derive(Debug, Default)]
struct Store {
    sessions: HashMap<SessionToken, Session>,
    by_user: HashMap<String, HashSet<SessionToken>>,
}

impl Store {
    fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, sess| sess.expires_at > now);
        let sessions = &self.sessions;
        self.by_user.retain(|_, tokens| {
            tokens.retain(|t| sessions.contains_key(t));
            !tokens.is_empty()
        });
        before - self.sessions.len()
    }
}

/// In-memory session store. Clones share the same sessions.
#[derive(Debug, Clone)]
pub struct SessionManager {
    ttl: Duration,
    store: Arc<RwLock<Store>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

fn gen_token() -> AppResult<SessionToken> {
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| AppError::internal("token".to_string(), e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, store: Arc::new(RwLock::new(Store::default())) }
    }

    pub fn ttl(&self) -> Duration { self.ttl }

    pub fn issue(&self, user: UserContext) -> AppResult<Session> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let session = Session {
            token: gen_token()?,
            user,
            issued_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        {
            let mut s = self.store.write();
            s.prune_expired(now);
            s.by_user.entry(session.user.user_id.clone()).or_default().insert(session.token.clone());
            s.sessions.insert(session.token.clone(), session.clone());
        }
        info!(target: "civiq::session", user = %session.user.user_id, ttl_secs = self.ttl.as_secs(), "session issued");
        Ok(session)
    }

    /// Returns the user for a live session; an expired session is dropped.
    pub fn validate(&self, token: &str) -> Option<UserContext> {
        let now = Utc::now();
        let expired = {
            let s = self.store.read();
            match s.sessions.get(token) {
                Some(sess) if sess.expires_at > now => return Some(sess.user.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.remove(token);
        }
        None
    }

    pub fn logout(&self, token: &str) -> bool {
        let removed = self.remove(token);
        if let Some(sess) = &removed {
            info!(target: "civiq::session", user = %sess.user.user_id, "session closed");
        }
        removed.is_some()
    }

    pub fn revoke_user(&self, user_id: &str) -> usize {
        let mut s = self.store.write();
        let tokens = s.by_user.remove(user_id).unwrap_or_default();
        let count = tokens.iter().filter(|t| s.sessions.remove(*t).is_some()).count();
        info!(target: "civiq::session", user = %user_id, count, "sessions revoked");
        count
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let removed = self.store.write().prune_expired(now);
        if removed > 0 {
            debug!(target: "civiq::session", removed, "expired sessions pruned");
        }
        removed
    }

    /// Sessions that have not expired yet.
    pub fn active_count(&self) -> usize {
        let now = Utc::now();
        self.store.read().sessions.values().filter(|s| s.expires_at > now).count()
    }

    fn remove(&self, token: &str) -> Option<Session> {
        let mut s = self.store.write();
        let sess = s.sessions.remove(token)?;
        if let Some(set) = s.by_user.get_mut(&sess.user.user_id) {
            set.remove(token);
            if set.is_empty() { s.by_user.remove(&sess.user.user_id); }
        }
        Some(sess)
    }
}

impl SessionSource for SessionManager {
    fn lookup(&self, token: &str) -> SessionState {
        SessionState::Resolved(self.validate(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::principal::CommuneId;
    use crate::identity::role::Role;

    fn user(id: &str) -> UserContext {
        UserContext::new(id, Role::AgentCommune, Some(CommuneId(5)))
    }

    #[test]
    fn issue_then_validate() {
        let sm = SessionManager::default();
        let s = sm.issue(user("alice")).unwrap();
        assert_eq!(sm.validate(&s.token), Some(user("alice")));
        assert_eq!(sm.lookup(&s.token), SessionState::Resolved(Some(user("alice"))));
        assert_eq!(sm.lookup("bogus"), SessionState::Resolved(None));
    }

    #[test]
    fn tokens_are_unique() {
        let sm = SessionManager::default();
        let a = sm.issue(user("alice")).unwrap();
        let b = sm.issue(user("alice")).unwrap();
        assert_ne!(a.token, b.token);
        assert_eq!(sm.active_count(), 2);
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let sm = SessionManager::new(Duration::from_secs(0));
        let s = sm.issue(user("alice")).unwrap();
        assert!(sm.validate(&s.token).is_none());
        assert_eq!(sm.active_count(), 0);
    }

    #[test]
    fn issuing_prunes_abandoned_expired_sessions() {
        let short = SessionManager::new(Duration::from_secs(0));
        for i in 0..50 {
            short.issue(user(&format!("u{i}"))).unwrap();
        }
        assert_eq!(short.active_count(), 0);

        let long = SessionManager { ttl: Duration::from_secs(3600), store: short.store.clone() };
        let s = long.issue(user("alice")).unwrap();
        assert_eq!(long.active_count(), 1);
        let store = long.store.read();
        assert_eq!(store.sessions.len(), 1);
        assert_eq!(store.by_user.len(), 1);
        assert!(store.sessions.contains_key(&s.token));
    }

    #[test]
    fn prune_clears_user_index() {
        let sm = SessionManager::default();
        sm.issue(user("alice")).unwrap();
        sm.issue(user("bob")).unwrap();
        assert_eq!(sm.prune_expired(Utc::now()), 0);
        assert_eq!(sm.prune_expired(Utc::now() + chrono::Duration::hours(2)), 2);
        assert!(sm.store.read().by_user.is_empty());
        assert_eq!(sm.prune_expired(Utc::now()), 0);
    }

    #[test]
    fn logout_and_revoke() {
        let sm = SessionManager::default();
        let a = sm.issue(user("alice")).unwrap();
        let _b = sm.issue(user("alice")).unwrap();
        let c = sm.issue(user("bob")).unwrap();
        assert!(sm.logout(&a.token));
        assert!(!sm.logout(&a.token));
        assert_eq!(sm.revoke_user("alice"), 1);
        assert!(sm.validate(&c.token).is_some());
        assert_eq!(sm.active_count(), 1);
    }
}
