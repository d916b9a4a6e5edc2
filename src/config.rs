//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup and passed explicitly into every service.

use std::env;
use std::time::Duration;

/// OAuth client credentials for one provider.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Base URLs for every outbound provider call.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub google_auth: String,
    pub google_oauth: String,
    pub google_userinfo: String,
    pub google_docs: String,
    pub google_drive_activity: String,
    pub github_oauth: String,
    pub github_api: String,
    pub dropbox_oauth: String,
    pub dropbox_api: String,
}

impl ProviderEndpoints {
    pub fn production() -> Self {
        Self {
            google_auth: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            google_oauth: "https://oauth2.googleapis.com".to_string(),
            google_userinfo: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
            google_docs: "https://docs.googleapis.com".to_string(),
            google_drive_activity: "https://driveactivity.googleapis.com".to_string(),
            github_oauth: "https://github.com/login/oauth".to_string(),
            github_api: "https://api.github.com".to_string(),
            dropbox_oauth: "https://api.dropboxapi.com/oauth2".to_string(),
            dropbox_api: "https://api.dropboxapi.com".to_string(),
        }
    }

    /// Point every provider at one server (used with mock servers in tests).
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            google_auth: format!("{base}/google/auth"),
            google_oauth: format!("{base}/google/oauth"),
            google_userinfo: format!("{base}/google/userinfo"),
            google_docs: format!("{base}/google/docs"),
            google_drive_activity: format!("{base}/google/driveactivity"),
            github_oauth: format!("{base}/github/oauth"),
            github_api: format!("{base}/github/api"),
            dropbox_oauth: format!("{base}/dropbox/oauth"),
            dropbox_api: format!("{base}/dropbox/api"),
        }
    }
}

/// Which document store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub google: ProviderCredentials,
    pub github: ProviderCredentials,
    pub dropbox: ProviderCredentials,
    pub endpoints: ProviderEndpoints,

    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Session lifetime in seconds
    pub jwt_ttl_secs: i64,
    /// HMAC key for OAuth `state`
    pub oauth_state_key: Vec<u8>,
    /// Secure cross-site cookies when true
    pub production: bool,

    /// Frontend URL for OAuth redirects and CORS
    pub frontend_url: String,
    /// Public URL of this API (builds the Google redirect URI)
    pub api_url: String,
    pub port: u16,
    pub gcp_project_id: String,
    pub gcp_region: String,
    pub store_backend: StoreBackend,

    pub provider_timeout: Duration,
    pub provider_retry_backoff: Duration,
    /// Offset from UTC for rendered activity times
    pub display_utc_offset_minutes: i32,
    /// bcrypt work factor for local passwords
    pub bcrypt_cost: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = required("JWT_SIGNING_KEY")?.into_bytes();
        let oauth_state_key = env::var("OAUTH_STATE_KEY")
            .map(String::into_bytes)
            .unwrap_or_else(|_| jwt_signing_key.clone());

        let store_backend = match env::var("STORE_BACKEND").as_deref() {
            Ok("memory") => StoreBackend::Memory,
            Ok("firestore") | Err(_) => StoreBackend::Firestore,
            Ok(_) => return Err(ConfigError::Invalid("STORE_BACKEND")),
        };

        Ok(Self {
            google: credentials("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET")?,
            github: credentials("GITHUB_CLIENT_ID", "GITHUB_CLIENT_SECRET")?,
            dropbox: credentials("DROPBOX_CLIENT_ID", "DROPBOX_CLIENT_SECRET")?,
            endpoints: ProviderEndpoints::production(),
            jwt_signing_key,
            jwt_ttl_secs: parsed("JWT_TTL_SECS", 7 * 24 * 3600)?,
            oauth_state_key,
            production: env::var("APP_ENV").is_ok_and(|v| v == "production"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: env::var("API_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            port: parsed("PORT", 8080)?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-central1".to_string()),
            store_backend,
            provider_timeout: Duration::from_secs(parsed("PROVIDER_TIMEOUT_SECS", 10)?),
            provider_retry_backoff: Duration::from_millis(parsed("PROVIDER_RETRY_BACKOFF_MS", 250)?),
            display_utc_offset_minutes: parsed("DISPLAY_UTC_OFFSET_MINUTES", 330)?,
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        })
    }

    /// Config for tests, with every provider pointed at `mock_base`.
    pub fn test_default(mock_base: &str) -> Self {
        let creds = |name: &str| ProviderCredentials {
            client_id: format!("{name}_client_id"),
            client_secret: format!("{name}_secret"),
        };
        Self {
            google: creds("google"),
            github: creds("github"),
            dropbox: creds("dropbox"),
            endpoints: ProviderEndpoints::with_base(mock_base),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            jwt_ttl_secs: 3600,
            oauth_state_key: b"test_state_key_32_bytes_minimum!".to_vec(),
            production: false,
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            port: 8080,
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-central1".to_string(),
            store_backend: StoreBackend::Memory,
            provider_timeout: Duration::from_secs(2),
            provider_retry_backoff: Duration::from_millis(10),
            display_utc_offset_minutes: 330,
            bcrypt_cost: 4,
        }
    }

    /// Redirect URI registered with Google for the connect flow.
    pub fn google_redirect_uri(&self) -> String {
        format!(
            "{}/api/v1/users/oauth2callback",
            self.api_url.trim_end_matches('/')
        )
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn credentials(id: &'static str, secret: &'static str) -> Result<ProviderCredentials, ConfigError> {
    Ok(ProviderCredentials {
        client_id: required(id)?,
        client_secret: required(secret)?,
    })
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(v) => v.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("GOOGLE_CLIENT_ID", "gid");
        env::set_var("GOOGLE_CLIENT_SECRET", "gsecret");
        env::set_var("GITHUB_CLIENT_ID", "hid");
        env::set_var("GITHUB_CLIENT_SECRET", "hsecret");
        env::set_var("DROPBOX_CLIENT_ID", "did");
        env::set_var("DROPBOX_CLIENT_SECRET", " dsecret ");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.google.client_id, "gid");
        assert_eq!(config.dropbox.client_secret, "dsecret");
        assert_eq!(config.jwt_ttl_secs, 7 * 24 * 3600);
        assert_eq!(config.oauth_state_key, config.jwt_signing_key);
        assert_eq!(config.provider_timeout, Duration::from_secs(10));
        assert_eq!(config.display_utc_offset_minutes, 330);
    }

    #[test]
    fn test_redirect_uri_and_mock_endpoints() {
        let config = Config::test_default("http://127.0.0.1:9999/");
        assert_eq!(
            config.google_redirect_uri(),
            "http://localhost:8080/api/v1/users/oauth2callback"
        );
        assert_eq!(
            config.endpoints.dropbox_api,
            "http://127.0.0.1:9999/dropbox/api"
        );
    }
}
