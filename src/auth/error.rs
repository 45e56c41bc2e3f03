/// Failures surfaced by [`AuthService`](super::AuthService) operations.
///
/// Corrupt snapshots never show up here: the store recovers them as an
/// empty mapping. Falling back to guest mode is an outcome, not an error.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Profile {0} already exists. Use change-password endpoint to modify it.")]
    AlreadyExists(String),

    #[error("Profile {0} not found")]
    NotFound(String),

    #[error("Current password is incorrect")]
    Unauthorized,

    #[error("Profile name cannot be empty")]
    InvalidProfile,

    /// The freshly generated hash is already a key in the store.
    #[error("Generated password hash collides with an existing record")]
    HashCollision,

    /// Input beyond bcrypt's limit is refused, never truncated.
    #[error("Password is too long (at most 71 bytes)")]
    PasswordTooLong(usize),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    /// Display stays generic; the source chain carries paths and is only logged.
    #[error("Credential store unavailable")]
    Storage(#[from] anyhow::Error),
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(err: bcrypt::BcryptError) -> Self {
        match err {
            bcrypt::BcryptError::Truncation(len) => Self::PasswordTooLong(len),
            other => Self::Hashing(other.to_string()),
        }
    }
}


pub type AuthResult<T> = std::result::Result<T, AuthError>;
