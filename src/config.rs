use serde::Deserialize;
use tracing::warn;

/// Secrets and lifetimes for the two JWT kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_expiry: String,
    pub refresh_secret: String,
    pub refresh_expiry: String,
}

/// Object storage credentials. `cloud_name` is the bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub endpoint: String,
    pub region: String,
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub tokens: TokenConfig,
    pub media: MediaConfig,
    pub upload_temp_dir: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;

        let tokens = TokenConfig {
            access_secret: secret_var("ACCESS_TOKEN_SECRET"),
            access_expiry: std::env::var("ACCESS_TOKEN_EXPIRY").unwrap_or_else(|_| "1d".into()),
            refresh_secret: secret_var("REFRESH_TOKEN_SECRET"),
            refresh_expiry: std::env::var("REFRESH_TOKEN_EXPIRY").unwrap_or_else(|_| "10d".into()),
        };

        let media = MediaConfig {
            cloud_name: std::env::var("MEDIA_CLOUD_NAME")?,
            api_key: std::env::var("MEDIA_API_KEY")?,
            api_secret: std::env::var("MEDIA_API_SECRET")?,
            endpoint: std::env::var("MEDIA_ENDPOINT")?,
            region: std::env::var("MEDIA_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_url: std::env::var("MEDIA_PUBLIC_URL").ok(),
        };

        let upload_temp_dir =
            std::env::var("UPLOAD_TEMP_DIR").unwrap_or_else(|_| "./public/temp".into());

        Ok(Self {
            database_url,
            tokens,
            media,
            upload_temp_dir,
        })
    }
}

// Token secrets are checked when a token is issued, not at boot.
fn secret_var(name: &str) -> String {
    match std::env::var(name) {
        Ok(v) => v,
        Err(_) => {
            warn!(var = name, "token secret not set; token issuance will fail");
            String::new()
        }
    }
}
