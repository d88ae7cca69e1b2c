/*!
 * Configuration Module
 *
 * Loads environment variables for the Livestream Ingestor.
 */

use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct IngestorConfig {
    pub database_url: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub jwt_secret: String,
    pub http_port: u16,
    pub metrics_port: u16,
    pub stream_maxlen: usize,
}

impl IngestorConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;

        let redis_host = env::var("REDIS_HOST").context("REDIS_HOST not set")?;
        let redis_port = env::var("REDIS_PORT")
            .context("REDIS_PORT not set")?
            .parse::<u16>()
            .context("REDIS_PORT must be a valid port number")?;
        let redis_password = env::var("REDIS_PASSWORD").ok();

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET not set")?;

        let http_port = env::var("INGESTOR_HTTP_PORT")
            .unwrap_or_else(|_| "8081".to_string())
            .parse::<u16>()
            .context("INGESTOR_HTTP_PORT must be a valid port number")?;

        let metrics_port = env::var("INGESTOR_METRICS_PORT")
            .unwrap_or_else(|_| "9091".to_string())
            .parse::<u16>()
            .context("INGESTOR_METRICS_PORT must be a valid port number")?;

        let stream_maxlen = env::var("STREAM_MAXLEN")
            .unwrap_or_else(|_| "10000".to_string())
            .parse::<usize>()
            .context("STREAM_MAXLEN must be a valid number")?;

        Ok(Self {
            database_url,
            redis_host,
            redis_port,
            redis_password,
            jwt_secret,
            http_port,
            metrics_port,
            stream_maxlen,
        })
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{}@{}:{}/",
                password, self.redis_host, self.redis_port
            ),
            None => format!("redis://{}:{}/", self.redis_host, self.redis_port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url_without_password() {
        let config = IngestorConfig {
            database_url: "postgres://x".to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: None,
            jwt_secret: "secret".to_string(),
            http_port: 8081,
            metrics_port: 9091,
            stream_maxlen: 10_000,
        };
        assert_eq!(config.redis_url(), "redis://localhost:6379/");
    }

    #[test]
    fn test_redis_url_with_password() {
        let config = IngestorConfig {
            database_url: "postgres://x".to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: Some("secret123".to_string()),
            jwt_secret: "secret".to_string(),
            http_port: 8081,
            metrics_port: 9091,
            stream_maxlen: 10_000,
        };
        assert_eq!(config.redis_url(), "redis://:secret123@localhost:6379/");
    }
}
