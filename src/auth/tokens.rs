use std::time::Duration;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::claims::{AccessClaims, Identity, RefreshClaims};
use super::error::CredentialError;
use crate::config::TokenConfig;

/// Issues and verifies the access/refresh JWT pair. Stateless per call; the
/// configuration is injected once at startup. Password hashing lives in
/// [`super::password`].
#[derive(Clone)]
pub struct CredentialManager {
    config: TokenConfig,
}

impl CredentialManager {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    pub fn issue_access_token(&self, identity: Identity<'_>) -> Result<String, CredentialError> {
        let secret = require_secret(&self.config.access_secret, "ACCESS_TOKEN_SECRET")?;
        let (iat, exp) = validity_window(&self.config.access_expiry)?;
        let claims = AccessClaims {
            id: identity.id,
            email: identity.email.to_owned(),
            username: identity.username.to_owned(),
            fullname: identity.fullname.to_owned(),
            iat,
            exp,
        };
        let token = sign(&claims, secret)?;
        debug!(user_id = %identity.id, "access token issued");
        Ok(token)
    }

    pub fn issue_refresh_token(&self, identity: Identity<'_>) -> Result<String, CredentialError> {
        let secret = require_secret(&self.config.refresh_secret, "REFRESH_TOKEN_SECRET")?;
        let (iat, exp) = validity_window(&self.config.refresh_expiry)?;
        let claims = RefreshClaims {
            id: identity.id,
            jti: Uuid::new_v4(),
            iat,
            exp,
        };
        let token = sign(&claims, secret)?;
        debug!(user_id = %identity.id, "refresh token issued");
        Ok(token)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, CredentialError> {
        let secret = require_secret(&self.config.access_secret, "ACCESS_TOKEN_SECRET")?;
        verify(token, secret)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, CredentialError> {
        let secret = require_secret(&self.config.refresh_secret, "REFRESH_TOKEN_SECRET")?;
        verify(token, secret)
    }
}

fn require_secret<'a>(secret: &'a str, name: &'static str) -> Result<&'a str, CredentialError> {
    if secret.is_empty() {
        return Err(CredentialError::MissingSecret(name));
    }
    Ok(secret)
}

/// `(iat, exp)` for a token issued now. An expiry that would push `exp`
/// past `usize::MAX` is rejected like any other bad expiry string.
fn validity_window(expiry: &str) -> Result<(usize, usize), CredentialError> {
    let ttl = parse_expiry(expiry)?;
    let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
    let exp = usize::try_from(ttl.as_secs())
        .ok()
        .and_then(|secs| now.checked_add(secs))
        .ok_or_else(|| CredentialError::InvalidExpiry {
            value: expiry.trim().to_owned(),
        })?;
    Ok((now, exp))
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> Result<String, CredentialError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(CredentialError::Sign)
}

fn verify<T: DeserializeOwned>(token: &str, secret: &str) -> Result<T, CredentialError> {
    let data = decode::<T>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(CredentialError::InvalidToken)?;
    Ok(data.claims)
}

/// Parse an expiry setting. Bare digits are seconds; anything else goes
/// through humantime (`15m`, `1d`, `10days`).
pub fn parse_expiry(value: &str) -> Result<Duration, CredentialError> {
    let value = value.trim();
    let invalid = || CredentialError::InvalidExpiry {
        value: value.to_owned(),
    };
    let ttl = if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        Duration::from_secs(value.parse().map_err(|_| invalid())?)
    } else {
        humantime::parse_duration(value).map_err(|_| invalid())?
    };
    if ttl.is_zero() {
        return Err(invalid());
    }
    Ok(ttl)
}
