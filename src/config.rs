use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
}

/// Which backends hold documents and files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// DynamoDB tables and an S3 bucket.
    Aws,
    /// Process-local maps; nothing survives a restart.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(StorageBackend::Aws),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("expected 'aws' or 'memory', got '{}'", other)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImageApiConfig {
    pub url: String,
    pub api_key: String,
    pub model: Option<String>,
    pub size: String,
}

#[derive(Clone, Debug)]
pub struct BootstrapAdmin {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub storage_backend: StorageBackend,
    pub meme_bucket_name: String,
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    pub table_prefix: String,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub image_api: Option<ImageApiConfig>,
    pub ffmpeg_path: String,
    pub max_upload_bytes: usize,
    pub default_commission_bps: u32,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();

        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:3000")?;
        let storage_backend = parse_var("STORAGE_BACKEND", "aws")?;

        let meme_bucket_name = match storage_backend {
            StorageBackend::Aws => env::var("MEME_BUCKET_NAME")
                .map_err(|_| ConfigError::MissingVar("MEME_BUCKET_NAME".into()))?,
            StorageBackend::Memory => env::var("MEME_BUCKET_NAME").unwrap_or_else(|_| "memes".to_string()),
        };

        let aws_region = env::var("AWS_DEFAULT_REGION").unwrap_or_else(|_| "ca-central-1".to_string());
        let localstack_endpoint = env::var("AWS_ENDPOINT_URL").ok();
        let table_prefix = env::var("TABLE_PREFIX").unwrap_or_else(|_| "meme_marketplace_".to_string());

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET".into()))?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::InvalidVar(
                "JWT_SECRET".into(),
                "must be at least 16 bytes".into(),
            ));
        }
        let jwt_ttl_hours: i64 = parse_var("JWT_TTL_HOURS", "24")?;

        let image_api = match (env::var("IMAGE_API_URL"), env::var("IMAGE_API_KEY")) {
            (Ok(url), Ok(api_key)) => Some(ImageApiConfig {
                url,
                api_key,
                model: env::var("IMAGE_API_MODEL").ok(),
                size: env::var("IMAGE_SIZE").unwrap_or_else(|_| "1024x1024".to_string()),
            }),
            _ => None,
        };

        let ffmpeg_path = env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());
        let max_upload_bytes = parse_var("MAX_UPLOAD_BYTES", "10485760")?;

        let default_commission_bps: u32 = parse_var("DEFAULT_COMMISSION_BPS", "1000")?;
        if default_commission_bps > crate::ledger::MAX_COMMISSION_BPS {
            return Err(ConfigError::InvalidVar(
                "DEFAULT_COMMISSION_BPS".into(),
                format!("must not exceed {}", crate::ledger::MAX_COMMISSION_BPS),
            ));
        }

        let bootstrap_admin = match (env::var("SUPER_ADMIN_EMAIL"), env::var("SUPER_ADMIN_PASSWORD")) {
            (Ok(email), Ok(password)) => Some(BootstrapAdmin {
                email,
                password,
                username: env::var("SUPER_ADMIN_USERNAME").unwrap_or_else(|_| "superadmin".to_string()),
            }),
            _ => None,
        };

        Ok(Config {
            bind_address,
            storage_backend,
            meme_bucket_name,
            aws_region,
            localstack_endpoint,
            table_prefix,
            jwt_secret,
            jwt_ttl_hours,
            image_api,
            ffmpeg_path,
            max_upload_bytes,
            default_commission_bps,
            bootstrap_admin,
        })
    }

    /// Configuration for in-process use: memory backends, no integrations.
    pub fn in_memory(jwt_secret: impl Into<String>) -> Self {
        Config {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            storage_backend: StorageBackend::Memory,
            meme_bucket_name: "memes".to_string(),
            aws_region: "ca-central-1".to_string(),
            localstack_endpoint: None,
            table_prefix: String::new(),
            jwt_secret: jwt_secret.into(),
            jwt_ttl_hours: 24,
            image_api: None,
            ffmpeg_path: "ffmpeg".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            default_commission_bps: 1000,
            bootstrap_admin: None,
        }
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidVar(name.into(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_backend_parses_case_insensitively() {
        assert_eq!("AWS".parse::<StorageBackend>(), Ok(StorageBackend::Aws));
        assert_eq!("memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert!("sqlite".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn in_memory_config_has_no_integrations() {
        let config = Config::in_memory("0123456789abcdef");
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert!(config.image_api.is_none());
        assert_eq!(config.default_commission_bps, 1000);
    }
}
