use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub fullname: String,
    pub iat: usize, // issued at (unix timestamp)
    pub exp: usize, // expires at (unix timestamp)
}

/// Payload of a refresh token. Identity only; `jti` is a random nonce so
/// two tokens issued within the same second still differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshClaims {
    pub id: Uuid,
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

/// The fields of a user that go into tokens.
#[derive(Debug, Clone, Copy)]
pub struct Identity<'a> {
    pub id: Uuid,
    pub email: &'a str,
    pub username: &'a str,
    pub fullname: &'a str,
}
