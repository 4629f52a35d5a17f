use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::{password, CredentialError, CredentialManager, Identity};

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String, // trimmed, lowercase
    pub email: String,    // trimmed, lowercase
    pub fullname: String,
    pub avatar: String, // object store URL
    pub cover_image: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    /// Plaintext waiting to be hashed by [`User::before_save`].
    #[sqlx(skip)]
    #[serde(skip)]
    pending_password: Option<PendingPassword>,
}

#[derive(Clone)]
struct PendingPassword(String);

impl fmt::Debug for PendingPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingPassword(..)")
    }
}

/// Input for a fresh registration.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub fullname: &'a str,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub password: &'a str,
}

pub fn normalize_handle(value: &str) -> String {
    value.trim().to_lowercase()
}

impl User {
    pub fn new(new: NewUser<'_>) -> Self {
        let now = OffsetDateTime::now_utc();
        let mut user = Self {
            id: Uuid::new_v4(),
            username: normalize_handle(new.username),
            email: normalize_handle(new.email),
            fullname: new.fullname.trim().to_string(),
            avatar: new.avatar,
            cover_image: new.cover_image,
            password_hash: String::new(),
            refresh_token: None,
            created_at: now,
            updated_at: now,
            pending_password: None,
        };
        user.set_password(new.password);
        user
    }

    /// Mark the password as modified. Hashing happens in `before_save`.
    pub fn set_password(&mut self, plain: &str) {
        self.pending_password = Some(PendingPassword(plain.to_string()));
    }

    /// Runs right before every write. Normalizes handles and hashes the
    /// password only if it was modified since the last save. Returns whether
    /// a new hash was computed.
    pub fn before_save(&mut self) -> Result<bool, CredentialError> {
        self.username = normalize_handle(&self.username);
        self.email = normalize_handle(&self.email);
        self.fullname = self.fullname.trim().to_string();

        let Some(pending) = &self.pending_password else {
            return Ok(false);
        };
        self.password_hash = password::hash_password(&pending.0)?;
        self.pending_password = None;
        Ok(true)
    }

    pub fn is_password_correct(&self, candidate: &str) -> Result<bool, CredentialError> {
        password::verify_password(candidate, &self.password_hash)
    }

    pub fn identity(&self) -> Identity<'_> {
        Identity {
            id: self.id,
            email: &self.email,
            username: &self.username,
            fullname: &self.fullname,
        }
    }

    pub fn generate_access_token(
        &self,
        credentials: &CredentialManager,
    ) -> Result<String, CredentialError> {
        credentials.issue_access_token(self.identity())
    }

    pub fn generate_refresh_token(
        &self,
        credentials: &CredentialManager,
    ) -> Result<String, CredentialError> {
        credentials.issue_refresh_token(self.identity())
    }
}
