//! Password → profile authentication.
//!
//! Provides:
//! - bcrypt password hashing (self-describing, per-hash random salt)
//! - A credential store persisted as one JSON snapshot (hash → profile id)
//! - In-memory session tokens (URL-safe, 24h, SHA-256 hashed for lookup)
//! - The login policy tying them together, including first-use registration
//!   and the guest fallback
//!
//! ## Design Decisions
//! - The snapshot is reloaded for every operation and rewritten wholesale on
//!   every change; a process-wide lock around load → modify → save is the only
//!   consistency mechanism.
//! - Sessions are not persisted. Restarting the server logs everyone out.
//! - Expired tokens are removed lazily on lookup; an optional sweep task can
//!   reclaim the rest.

pub mod error;
pub mod hasher;
pub mod service;
pub mod session;
pub mod store;

pub use error::{AuthError, AuthResult};
pub use hasher::PasswordHasher;
pub use service::{AuthService, LoginOutcome};
pub use session::{SessionRegistry, TokenStatus};
pub use store::{
    CredentialBackend, CredentialRecord, CredentialStore, Credentials, JsonFileBackend,
    MemoryBackend,
};
