use thiserror::Error;

/// A hashing, signing or token-validation step failed.
///
/// A password mismatch is not an error; see [`super::password::verify_password`].
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0} is not configured")]
    MissingSecret(&'static str),

    #[error("invalid token expiry {value:?}")]
    InvalidExpiry { value: String },

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("token signing failed: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),

    #[error("invalid or expired token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
}
