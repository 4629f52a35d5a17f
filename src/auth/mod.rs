pub mod claims;
pub mod error;
pub(crate) mod extractors;
pub mod password;
pub mod tokens;

pub use claims::Identity;
pub use error::CredentialError;
pub use extractors::AuthUser;
pub use tokens::CredentialManager;
