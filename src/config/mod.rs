//! Configuration module for the portal backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Admin API key for bearer authentication (required in production)
    pub admin_api_key: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Directory holding on-disk template fallbacks
    pub templates_dir: PathBuf,
    /// Base URL of the hosting provider's REST API
    pub hosting_api_url: String,
    /// Bearer token for the hosting provider
    pub hosting_api_token: String,
    /// Base URL of the blob storage provider
    pub blob_store_url: String,
    /// Access token for the blob storage provider
    pub blob_store_token: String,
    /// Secret used to sign direct-upload tokens
    pub upload_token_secret: String,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let admin_api_key = env::var("PORTAL_ADMIN_API_KEY").ok();

        let db_path = env::var("PORTAL_DB_PATH")
            .unwrap_or_else(|_| "./data/portal.sqlite".to_string())
            .into();

        let templates_dir = env::var("PORTAL_TEMPLATES_DIR")
            .unwrap_or_else(|_| "./templates".to_string())
            .into();

        let hosting_api_url = env::var("PORTAL_HOSTING_API_URL")
            .unwrap_or_else(|_| "https://api.hosting.invalid".to_string());
        let hosting_api_token = env::var("PORTAL_HOSTING_API_TOKEN").unwrap_or_default();

        let blob_store_url =
            env::var("PORTAL_BLOB_STORE_URL").unwrap_or_else(|_| "https://blob.invalid".to_string());
        let blob_store_token = env::var("PORTAL_BLOB_STORE_TOKEN").unwrap_or_default();

        let upload_token_secret = env::var("PORTAL_UPLOAD_TOKEN_SECRET")
            .unwrap_or_else(|_| "insecure-dev-secret".to_string());

        let bind_addr = env::var("PORTAL_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .expect("Invalid PORTAL_BIND_ADDR format");

        let log_level = env::var("PORTAL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Self {
            admin_api_key,
            db_path,
            templates_dir,
            hosting_api_url,
            hosting_api_token,
            blob_store_url,
            blob_store_token,
            upload_token_secret,
            bind_addr,
            log_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        env::remove_var("PORTAL_ADMIN_API_KEY");
        env::remove_var("PORTAL_DB_PATH");
        env::remove_var("PORTAL_TEMPLATES_DIR");
        env::remove_var("PORTAL_BIND_ADDR");
        env::remove_var("PORTAL_LOG_LEVEL");

        let config = Config::from_env();

        assert!(config.admin_api_key.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/portal.sqlite"));
        assert_eq!(config.templates_dir, PathBuf::from("./templates"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
    }
}
