//! In-memory session tokens
//!
//! Tokens are opaque bearer credentials held only in process memory, so
//! a restart invalidates every session. Expiry is observed lazily when a
//! token is verified; there is no background timer.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;

struct SessionToken {
    subject: String,
    expires_at: DateTime<Utc>,
}

/// Owned store of active session tokens, guarded by one lock.
///
/// Constructed once at startup and carried in the application state.
/// Contention is low: one write per login or logout, one read per
/// authenticated request.
#[derive(Default)]
pub struct SessionStore {
    tokens: Mutex<HashMap<String, SessionToken>>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore::default()
    }

    /// Issues a fresh token for `subject` that expires after
    /// `ttl_seconds`.
    ///
    /// 32 alphanumeric characters sampled from the OS-seeded generator,
    /// about 190 bits of entropy.
    pub fn issue(&self, subject: &str, ttl_seconds: i64) -> String {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        let session = SessionToken {
            subject: subject.to_string(),
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
        };

        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.insert(token.clone(), session);
        }
        token
    }

    /// Returns the subject behind a valid token.
    ///
    /// A token found at or past its expiry is removed on the spot and
    /// treated the same as an unknown token.
    pub fn verify(&self, token: &str) -> Option<String> {
        let mut tokens = self.tokens.lock().ok()?;

        match tokens.get(token) {
            Some(session) if Utc::now() >= session.expires_at => {
                tokens.remove(token);
                None
            }
            Some(session) => Some(session.subject.clone()),
            None => None,
        }
    }

    /// Removes every token belonging to `subject` (logout).
    pub fn revoke_all(&self, subject: &str) {
        if let Ok(mut tokens) = self.tokens.lock() {
            tokens.retain(|_, session| session.subject != subject);
        }
    }
}
