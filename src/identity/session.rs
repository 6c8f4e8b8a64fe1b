use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use tracing::debug;

use super::principal::Principal;

/// Length of the anti-forgery state token issued with each session.
pub const STATE_TOKEN_LEN: usize = 32;

// 32 symbols, so a random byte maps uniformly. Ambiguous glyphs
// (I, O, 0, 1) are excluded.
const STATE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Per-browser-session state. Identity fields are populated only after a
/// successful identity verification and removed on logout.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Anti-forgery token bound to this session for the login flow.
    pub state_token: String,
    pub principal: Option<Principal>,
    /// Provider access token, kept for later revocation.
    pub access_token: Option<String>,
    /// Provider subject, used for the idempotent reconnection guard.
    pub subject: Option<String>,
    pub expires_at: Instant,
}

/// Per-request snapshot of a session, passed explicitly to the
/// authorization gate. There is no process-wide mutable session handle.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub session_id: Option<String>,
    pub principal: Option<Principal>,
}

impl SessionContext {
    pub fn user_id(&self) -> Option<i64> {
        self.principal.as_ref().map(|p| p.user_id)
    }
}

fn gen_session_id() -> String {
    // 256-bit random id, base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).expect("OS entropy source unavailable");
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

fn gen_state_token() -> String {
    let mut buf = [0u8; STATE_TOKEN_LEN];
    getrandom::getrandom(&mut buf).expect("OS entropy source unavailable");
    buf.iter().map(|b| STATE_ALPHABET[(*b as usize) % STATE_ALPHABET.len()] as char).collect()
}

/// In-memory session store. Cloning shares the underlying map.
/// Entries carry a deadline; expired sessions read as unknown and are
/// dropped on access or during the sweep in `create`.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    ttl: Duration,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self { sessions: Arc::default(), ttl: Duration::from_secs(60 * 60) }
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { sessions: Arc::default(), ttl }
    }

    /// Create a fresh anonymous session with its anti-forgery token.
    /// Also sweeps out sessions past their deadline, so the map stays
    /// bounded by the number of live visitors.
    pub fn create(&self) -> Session {
        self.prune_expired();
        let sess = Session {
            id: gen_session_id(),
            state_token: gen_state_token(),
            principal: None,
            access_token: None,
            subject: None,
            expires_at: Instant::now() + self.ttl,
        };
        self.sessions.write().insert(sess.id.clone(), sess.clone());
        debug!(target: "curio::session", "session created sid={}", sess.id);
        sess
    }

    fn prune_expired(&self) {
        let now = Instant::now();
        self.sessions.write().retain(|_, s| s.expires_at > now);
    }

    /// Drop the entry once its deadline has passed. Returns whether the
    /// session is still live.
    fn expire_if_due(&self, sid: &str) -> bool {
        let due = {
            let map = self.sessions.read();
            match map.get(sid) {
                Some(sess) => sess.expires_at <= Instant::now(),
                None => return false,
            }
        };
        if due {
            self.sessions.write().remove(sid);
            debug!(target: "curio::session", "session expired sid={}", sid);
            return false;
        }
        true
    }

    /// Equality check of a submitted state value against the stored token.
    /// Unknown or expired sessions and mismatches all reject.
    pub fn verify_state(&self, sid: &str, submitted: &str) -> bool {
        if !self.expire_if_due(sid) {
            return false;
        }
        let map = self.sessions.read();
        match map.get(sid) {
            Some(sess) => sess.state_token == submitted,
            None => false,
        }
    }

    /// Record a verified identity on the session. Returns false when the
    /// session is unknown or expired.
    pub fn attach_identity(
        &self,
        sid: &str,
        principal: Principal,
        access_token: &str,
        subject: &str,
    ) -> bool {
        if !self.expire_if_due(sid) {
            return false;
        }
        let mut map = self.sessions.write();
        let Some(sess) = map.get_mut(sid) else { return false };
        debug!(target: "curio::session", "identity attached sid={} user_id={}", sid, principal.user_id);
        sess.principal = Some(principal);
        sess.access_token = Some(access_token.to_string());
        sess.subject = Some(subject.to_string());
        true
    }

    /// Remove all identity fields (logout). The session itself and its
    /// state token survive for further anonymous use.
    pub fn clear(&self, sid: &str) -> bool {
        if !self.expire_if_due(sid) {
            return false;
        }
        let mut map = self.sessions.write();
        let Some(sess) = map.get_mut(sid) else { return false };
        sess.principal = None;
        sess.access_token = None;
        sess.subject = None;
        debug!(target: "curio::session", "session cleared sid={}", sid);
        true
    }

    /// Per-request context for the given cookie value, anonymous when the
    /// cookie is absent, unknown or expired.
    pub fn context(&self, sid: Option<&str>) -> SessionContext {
        let Some(sid) = sid else { return SessionContext::default() };
        if !self.expire_if_due(sid) {
            return SessionContext::default();
        }
        let map = self.sessions.read();
        match map.get(sid) {
            Some(sess) => SessionContext {
                session_id: Some(sess.id.clone()),
                principal: sess.principal.clone(),
            },
            None => SessionContext::default(),
        }
    }

    /// Issue a fresh state token for an existing session, as on a repeat
    /// visit to the login page. Returns the new token, or None when the
    /// session is unknown.
    pub fn rotate_state(&self, sid: &str) -> Option<String> {
        if !self.expire_if_due(sid) {
            return None;
        }
        let mut map = self.sessions.write();
        let sess = map.get_mut(sid)?;
        sess.state_token = gen_state_token();
        Some(sess.state_token.clone())
    }

    pub fn access_token(&self, sid: &str) -> Option<String> {
        if !self.expire_if_due(sid) {
            return None;
        }
        self.sessions.read().get(sid).and_then(|s| s.access_token.clone())
    }

    pub fn connected_subject(&self, sid: &str) -> Option<String> {
        if !self.expire_if_due(sid) {
            return None;
        }
        self.sessions.read().get(sid).and_then(|s| s.subject.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal { user_id: 9, name: "Alice".into(), email: "a@b.com".into(), picture: None }
    }

    #[test]
    fn state_token_shape() {
        let sm = SessionManager::new();
        let sess = sm.create();
        assert_eq!(sess.state_token.chars().count(), STATE_TOKEN_LEN);
        assert!(sess.state_token.bytes().all(|b| STATE_ALPHABET.contains(&b)));
    }

    #[test]
    fn state_round_trip_accepts_own_token_only() {
        let sm = SessionManager::new();
        let sess = sm.create();
        assert!(sm.verify_state(&sess.id, &sess.state_token));
        assert!(!sm.verify_state(&sess.id, "SOMETHINGELSE234SOMETHINGELSE234"));
        assert!(!sm.verify_state("unknown-sid", &sess.state_token));
    }

    #[test]
    fn attach_then_clear_returns_to_anonymous() {
        let sm = SessionManager::new();
        let sess = sm.create();
        assert!(sm.attach_identity(&sess.id, principal(), "tok", "subj-1"));
        let ctx = sm.context(Some(&sess.id));
        assert_eq!(ctx.user_id(), Some(9));
        assert_eq!(sm.connected_subject(&sess.id).as_deref(), Some("subj-1"));

        assert!(sm.clear(&sess.id));
        let ctx = sm.context(Some(&sess.id));
        assert_eq!(ctx.user_id(), None);
        assert!(sm.access_token(&sess.id).is_none());
        // State token is still usable after logout
        assert!(sm.verify_state(&sess.id, &sess.state_token));
    }

    #[test]
    fn rotate_state_invalidates_the_old_token() {
        let sm = SessionManager::new();
        let sess = sm.create();
        let fresh = sm.rotate_state(&sess.id).unwrap();
        assert_ne!(fresh, sess.state_token);
        assert!(sm.verify_state(&sess.id, &fresh));
        assert!(!sm.verify_state(&sess.id, &sess.state_token));
        assert!(sm.rotate_state("unknown-sid").is_none());
    }

    #[test]
    fn unknown_cookie_yields_anonymous_context() {
        let sm = SessionManager::new();
        let ctx = sm.context(Some("nope"));
        assert!(ctx.session_id.is_none());
        assert!(ctx.principal.is_none());
    }

    #[test]
    fn expired_session_reads_as_unknown() {
        let sm = SessionManager::with_ttl(Duration::ZERO);
        let sess = sm.create();
        assert!(!sm.attach_identity(&sess.id, principal(), "tok", "subj-1"));

        let ctx = sm.context(Some(&sess.id));
        assert_eq!(ctx.user_id(), None);
        assert!(ctx.session_id.is_none());
        assert!(!sm.verify_state(&sess.id, &sess.state_token));
        assert!(sm.rotate_state(&sess.id).is_none());
        assert!(sm.access_token(&sess.id).is_none());
    }

    #[test]
    fn create_sweeps_out_expired_sessions() {
        let sm = SessionManager::with_ttl(Duration::ZERO);
        let old = sm.create();
        let fresh = sm.create();
        assert_ne!(old.id, fresh.id);
        assert!(!sm.verify_state(&old.id, &old.state_token));
    }

    #[test]
    fn fresh_sessions_get_distinct_ids_and_tokens() {
        let sm = SessionManager::new();
        let a = sm.create();
        let b = sm.create();
        assert_ne!(a.id, b.id);
        assert_ne!(a.state_token, b.state_token);
    }
}
