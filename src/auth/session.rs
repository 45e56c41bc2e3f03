//! In-memory session token registry.
//!
//! Tokens are 32 random bytes, URL-safe base64 without padding. Only the
//! SHA-256 digest of a token is kept as the map key; the plaintext is handed
//! to the client once and never stored.
//!
//! Expiry is lazy: an expired entry is removed by the first `verify` that sees
//! it, in the same critical section as the expiry check. Entries that are never
//! looked up again stay in memory until `sweep_expired` runs (if the gateway is
//! configured to run it) or the process exits.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Default session lifetime: 24 hours (seconds).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Token byte length before encoding (256 bits of entropy).
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct SessionEntry {
    profile_id: String,
    expires_at: DateTime<Utc>,
}

/// Result of checking a presented token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid { profile_id: String },
    Invalid,
}

impl TokenStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn profile_id(&self) -> Option<&str> {
        match self {
            Self::Valid { profile_id } => Some(profile_id),
            Self::Invalid => None,
        }
    }
}

/// Process-lifetime token → (profile, expiry) table.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    /// Registry with the default 24h lifetime.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL_SECS)
    }

    pub fn with_ttl(ttl_secs: u64) -> Self {
        let ttl_secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: Duration::try_seconds(ttl_secs).unwrap_or(Duration::MAX),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token for `profile_id`, valid for the registry's TTL.
    pub fn issue(&self, profile_id: &str) -> String {
        self.issue_at(profile_id, Utc::now())
    }

    pub(crate) fn issue_at(&self, profile_id: &str, now: DateTime<Utc>) -> String {
        let token = generate_token();
        let entry = SessionEntry {
            profile_id: profile_id.to_string(),
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.sessions.lock().insert(hash_token(&token), entry);
        tracing::debug!(profile = profile_id, "Issued session token");
        token
    }

    /// Check a presented token. Expired entries are removed on the spot.
    pub fn verify(&self, token: &str) -> TokenStatus {
        self.verify_at(token, Utc::now())
    }

    pub(crate) fn verify_at(&self, token: &str, now: DateTime<Utc>) -> TokenStatus {
        let key = hash_token(token);
        let mut sessions = self.sessions.lock();
        let Some(entry) = sessions.get(&key) else {
            return TokenStatus::Invalid;
        };
        if now < entry.expires_at {
            return TokenStatus::Valid {
                profile_id: entry.profile_id.clone(),
            };
        }
        if let Some(expired) = sessions.remove(&key) {
            tracing::debug!(profile = %expired.profile_id, "Session token expired");
        }
        TokenStatus::Invalid
    }

    /// Drop a token before it expires. Returns whether it existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.lock().remove(&hash_token(token)).is_some()
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now())
    }

    pub(crate) fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| now < entry.expires_at);
        before - sessions.len()
    }

    /// Entries currently held, expired-but-unvisited ones included.
    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// 32 CSPRNG bytes, URL-safe base64 (43 characters).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Map key for a token (SHA-256, single pass; tokens are already high-entropy).
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn issued_token_verifies_immediately() {
        let registry = SessionRegistry::new();
        let token = registry.issue("work");
        assert_eq!(
            registry.verify(&token),
            TokenStatus::Valid {
                profile_id: "work".into()
            }
        );
    }

    #[test]
    fn token_is_url_safe_with_256_bits() {
        let token = generate_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(URL_SAFE_NO_PAD.decode(&token).unwrap().len(), TOKEN_BYTES);
    }

    #[test]
    fn tokens_are_unique() {
        let registry = SessionRegistry::new();
        let a = registry.issue("p");
        let b = registry.issue("p");
        assert_ne!(a, b);
        assert_eq!(registry.active_count(), 2);
    }

    #[test]
    fn unknown_token_is_invalid() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.verify("nope"), TokenStatus::Invalid);
        assert_eq!(registry.verify(""), TokenStatus::Invalid);
    }

    #[test]
    fn plaintext_token_is_not_stored() {
        let registry = SessionRegistry::new();
        let token = registry.issue("p");
        let sessions = registry.sessions.lock();
        assert!(!sessions.contains_key(&token));
        assert!(sessions.contains_key(&hash_token(&token)));
    }

    #[test]
    fn token_is_invalid_after_expiry_and_removed() {
        let registry = SessionRegistry::new();
        let issued_at = Utc::now();
        let token = registry.issue_at("work", issued_at);

        let just_before = issued_at + Duration::hours(24) - Duration::seconds(1);
        assert!(registry.verify_at(&token, just_before).is_valid());

        let at_expiry = issued_at + Duration::hours(24);
        assert_eq!(registry.verify_at(&token, at_expiry), TokenStatus::Invalid);
        assert_eq!(registry.active_count(), 0);

        // Stays invalid even when checked "earlier" again.
        assert_eq!(registry.verify_at(&token, issued_at), TokenStatus::Invalid);
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let registry = SessionRegistry::with_ttl(0);
        let token = registry.issue("p");
        assert_eq!(registry.verify(&token), TokenStatus::Invalid);
    }

    #[test]
    fn huge_ttl_does_not_overflow() {
        let registry = SessionRegistry::with_ttl(u64::MAX);
        let token = registry.issue("p");
        assert!(registry.verify(&token).is_valid());
    }

    #[test]
    fn revoke_invalidates_token() {
        let registry = SessionRegistry::new();
        let token = registry.issue("p");
        assert!(registry.revoke(&token));
        assert!(!registry.revoke(&token));
        assert_eq!(registry.verify(&token), TokenStatus::Invalid);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let registry = SessionRegistry::with_ttl(60);
        let now = Utc::now();
        let old = registry.issue_at("old", now - Duration::seconds(120));
        let fresh = registry.issue_at("fresh", now);

        assert_eq!(registry.sweep_expired_at(now), 1);
        assert_eq!(registry.active_count(), 1);
        assert!(!registry.verify_at(&old, now).is_valid());
        assert_eq!(registry.verify_at(&fresh, now).profile_id(), Some("fresh"));
    }

    #[test]
    fn concurrent_verify_of_expired_token_is_consistent() {
        let registry = Arc::new(SessionRegistry::with_ttl(60));
        let now = Utc::now();
        let token = registry.issue_at("p", now - Duration::seconds(61));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let token = token.clone();
                std::thread::spawn(move || registry.verify_at(&token, now))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), TokenStatus::Invalid);
        }
        assert_eq!(registry.active_count(), 0);
    }
}
