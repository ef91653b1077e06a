//! Configuration management for the account service.
//!
//! Settings come from environment variables, with a `.env` file loaded in
//! development builds. Secrets (database URL, JWT secret) have no defaults
//! and fail loudly when missing; everything else falls back to sensible
//! local-development values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use tracing::info;

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub server: ServerSettings,
    pub email: EmailSettings,
    pub oauth: OAuthSettings,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Load .env file in development
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            server: ServerSettings::from_env()?,
            email: EmailSettings::from_env()?,
            oauth: OAuthSettings::from_env(),
        })
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,
            acquire_timeout: env::var("DATABASE_ACQUIRE_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("Invalid DATABASE_ACQUIRE_TIMEOUT")?,
        })
    }
}

/// JWT signing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            access_ttl_minutes: env::var("JWT_ACCESS_TTL_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("Invalid JWT_ACCESS_TTL_MINUTES")?,
            refresh_ttl_days: env::var("JWT_REFRESH_TTL_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid JWT_REFRESH_TTL_DAYS")?,
        })
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid SERVER_PORT")?,
        })
    }
}

/// Email (SMTP) configuration
///
/// When `smtp_host` is unset the email service runs in no-op mode and only
/// logs what it would have sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: String,
    pub frontend_base_url: String,
}

impl EmailSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            smtp_host: env::var("SMTP_HOST").ok(),
            smtp_port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .context("Invalid SMTP_PORT")?,
            smtp_username: env::var("SMTP_USERNAME").ok(),
            smtp_password: env::var("SMTP_PASSWORD").ok(),
            smtp_from: env::var("SMTP_FROM")
                .unwrap_or_else(|_| "noreply@localhost".to_string()),
            frontend_base_url: env::var("FRONTEND_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        })
    }
}

/// Federated sign-in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    pub google_client_id: Option<String>,
}

impl OAuthSettings {
    fn from_env() -> Self {
        Self {
            google_client_id: env::var("OAUTH_GOOGLE_CLIENT_ID").ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_settings_from_env() {
        env::set_var("JWT_SECRET", "test-secret-key");
        env::set_var("JWT_ACCESS_TTL_MINUTES", "15");

        let settings = JwtSettings::from_env().unwrap();

        assert_eq!(settings.secret, "test-secret-key");
        assert_eq!(settings.access_ttl_minutes, 15);
        assert_eq!(settings.refresh_ttl_days, 7); // Default

        env::remove_var("JWT_SECRET");
        env::remove_var("JWT_ACCESS_TTL_MINUTES");
    }

    #[test]
    fn test_database_settings_from_env() {
        env::set_var("DATABASE_URL", "postgres://localhost/test");
        env::set_var("DATABASE_MAX_CONNECTIONS", "50");

        let settings = DatabaseSettings::from_env().unwrap();

        assert_eq!(settings.url, "postgres://localhost/test");
        assert_eq!(settings.max_connections, 50);
        assert_eq!(settings.acquire_timeout, 10); // Default

        env::remove_var("DATABASE_URL");
        env::remove_var("DATABASE_MAX_CONNECTIONS");
    }

    #[test]
    fn test_email_settings_default_to_noop() {
        env::remove_var("SMTP_HOST");

        let settings = EmailSettings::from_env().unwrap();

        assert!(settings.smtp_host.is_none());
        assert_eq!(settings.smtp_port, 587);
    }
}
