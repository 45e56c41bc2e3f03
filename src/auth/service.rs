//! Login orchestration and profile administration.
//!
//! ## Login policy
//! 1. Load the credential snapshot (under the store lock).
//! 2. A non-empty claimed profile with no stored record is registered with the
//!    submitted password and gets a token straight away. Onboarding a new
//!    profile must not require a separate admin step.
//! 3. Otherwise every stored hash is tried in snapshot order; the first match
//!    wins, even if it belongs to a different profile than the one claimed.
//! 4. No match: open a guest window and report `Guest`. No token.

use super::error::{AuthError, AuthResult};
use super::hasher::PasswordHasher;
use super::session::{SessionRegistry, TokenStatus};
use super::store::CredentialStore;
use crate::browser::BrowserLauncher;
use std::sync::Arc;

/// What a login attempt resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The claimed profile was new; its password is now set.
    Registered { profile: String, token: String },
    /// The password matched a stored profile.
    Authenticated {
        profile: String,
        token: String,
        /// The matched profile is not the one the client claimed.
        different_profile: bool,
        claimed_profile: String,
    },
    /// Nothing matched; a guest window was requested.
    Guest,
}

impl LoginOutcome {
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Registered { token, .. } | Self::Authenticated { token, .. } => Some(token),
            Self::Guest => None,
        }
    }

    pub fn profile(&self) -> Option<&str> {
        match self {
            Self::Registered { profile, .. } | Self::Authenticated { profile, .. } => {
                Some(profile)
            }
            Self::Guest => None,
        }
    }
}

/// Owns the credential store and talks to the token registry and launcher.
pub struct AuthService {
    store: CredentialStore,
    hasher: PasswordHasher,
    sessions: Arc<SessionRegistry>,
    launcher: Arc<dyn BrowserLauncher>,
}

impl AuthService {
    pub fn new(
        store: CredentialStore,
        hasher: PasswordHasher,
        sessions: Arc<SessionRegistry>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions,
            launcher,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Resolve a submitted password against the stored profiles.
    pub fn login(&self, password: &str, claimed_profile: &str) -> AuthResult<LoginOutcome> {
        tracing::info!(profile = claimed_profile, "Login attempt");

        let mut tx = self.store.begin()?;
        if !claimed_profile.is_empty() && !tx.contains_profile(claimed_profile) {
            let hash = self.hasher.hash(password)?;
            if !tx.insert(hash, claimed_profile.to_string()) {
                return Err(AuthError::HashCollision);
            }
            tx.commit()?;

            let token = self.sessions.issue(claimed_profile);
            tracing::info!(profile = claimed_profile, "Profile password set on first login");
            return Ok(LoginOutcome::Registered {
                profile: claimed_profile.to_string(),
                token,
            });
        }
        let snapshot = tx.into_snapshot();

        for record in snapshot.iter() {
            if !self.hasher.verify(password, &record.password_hash) {
                continue;
            }
            let profile = record.profile_id.clone();
            let token = self.sessions.issue(&profile);
            let different_profile = !claimed_profile.is_empty() && claimed_profile != profile;
            if different_profile {
                tracing::info!(
                    claimed = claimed_profile,
                    matched = %profile,
                    "Password belongs to a different profile"
                );
            } else {
                tracing::info!(profile = %profile, "Login succeeded");
            }
            return Ok(LoginOutcome::Authenticated {
                profile,
                token,
                different_profile,
                claimed_profile: claimed_profile.to_string(),
            });
        }

        tracing::warn!(profile = claimed_profile, "No profile matched, falling back to guest");
        self.launcher.launch(None);
        Ok(LoginOutcome::Guest)
    }

    /// Check a session token.
    pub fn verify_token(&self, token: &str) -> TokenStatus {
        self.sessions.verify(token)
    }

    /// Revoke a session token. Returns whether it was active.
    pub fn logout(&self, token: &str) -> bool {
        self.sessions.revoke(token)
    }

    /// Register `profile` with `password`. Fails if the profile already has a record.
    pub fn add_profile(&self, profile: &str, password: &str) -> AuthResult<()> {
        if profile.is_empty() {
            return Err(AuthError::InvalidProfile);
        }

        let mut tx = self.store.begin()?;
        if tx.contains_profile(profile) {
            return Err(AuthError::AlreadyExists(profile.to_string()));
        }
        let hash = self.hasher.hash(password)?;
        if !tx.insert(hash, profile.to_string()) {
            return Err(AuthError::HashCollision);
        }
        tx.commit()?;

        tracing::info!(profile, "Profile added");
        Ok(())
    }

    /// Replace the password of an existing profile after checking the current one.
    pub fn change_password(
        &self,
        profile: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let mut tx = self.store.begin()?;
        let Some(old_hash) = tx.find_by_profile(profile).map(str::to_owned) else {
            return Err(AuthError::NotFound(profile.to_string()));
        };
        if !self.hasher.verify(current_password, &old_hash) {
            tracing::warn!(profile, "Password change rejected: current password is incorrect");
            return Err(AuthError::Unauthorized);
        }

        let new_hash = self.hasher.hash(new_password)?;
        tx.remove(&old_hash);
        if !tx.insert(new_hash, profile.to_string()) {
            return Err(AuthError::HashCollision);
        }
        tx.commit()?;

        tracing::info!(profile, "Password changed");
        Ok(())
    }

    /// Profile ids known to the credential store, in snapshot order.
    pub fn list_profiles(&self) -> AuthResult<Vec<String>> {
        Ok(self.store.load()?.profiles())
    }
}
