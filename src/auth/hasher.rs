//! bcrypt password hashing.
//!
//! Hashes are self-describing (`$2b$<cost>$<salt><digest>`), so the cost a
//! record was created with travels with it and `verify` needs nothing else.
//! Snapshots written by other bcrypt implementations (`$2a$`, `$2y$`) verify
//! as well.

/// Default bcrypt work factor for new hashes.
pub const DEFAULT_COST: u32 = bcrypt::DEFAULT_COST;

/// Lowest cost bcrypt accepts. Used by tests to keep them fast.
pub const MIN_COST: u32 = 4;

/// Highest cost bcrypt accepts.
pub const MAX_COST: u32 = 31;

/// Longest password accepted. bcrypt reads 72 bytes, including a NUL terminator.
pub const MAX_PASSWORD_BYTES: usize = 71;

/// One-way salted password hasher.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    /// Create a hasher with the given work factor, clamped to bcrypt's range.
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_COST, MAX_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password with a fresh random salt.
    ///
    /// Two calls with the same input never return the same string; compare
    /// with [`PasswordHasher::verify`], never with `==`.
    ///
    /// Passwords longer than [`MAX_PASSWORD_BYTES`] are rejected with
    /// `BcryptError::Truncation` rather than silently cut.
    pub fn hash(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::non_truncating_hash(password, self.cost)
    }

    /// Recompute and compare. Malformed hash strings and over-long passwords
    /// verify as `false`.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match bcrypt::non_truncating_verify(password, hash) {
            Ok(matched) => matched,
            Err(bcrypt::BcryptError::Truncation(len)) => {
                tracing::debug!(len, "Password exceeds bcrypt input limit");
                false
            }
            Err(e) => {
                tracing::debug!(error = %e, "Stored hash is not a valid bcrypt string");
                false
            }
        }
    }
}
