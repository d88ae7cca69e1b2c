/*!
 * Configuration Module for the Rule Engine
 */

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuleEngineConfig {
    pub database_url: String,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: Option<String>,
    pub jwt_secret: String,

    /// How many entries to request per stream per read (§4.3 "count ≈ 10").
    pub read_count: usize,
    /// Blocking read timeout in milliseconds (§4.3 "block ≈ 2 s").
    pub block_time_ms: usize,

    /// Base URL of the Device Service's internal webhook (§4.6).
    pub device_service_url: String,

    pub webhook_deadline: Duration,
    pub device_control_deadline: Duration,

    pub http_port: u16,
    pub metrics_port: u16,
}

impl RuleEngineConfig {
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

        let read_count = env::var("RULE_CONSUMER_READ_COUNT")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<usize>()
            .context("RULE_CONSUMER_READ_COUNT must be a valid number")?;

        let block_time_ms = env::var("RULE_CONSUMER_BLOCK_MS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse::<usize>()
            .context("RULE_CONSUMER_BLOCK_MS must be a valid number")?;

        let device_service_url = env::var("DEVICE_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:8083".to_string());

        let http_port = env::var("RULE_ENGINE_HTTP_PORT")
            .unwrap_or_else(|_| "8082".to_string())
            .parse::<u16>()
            .context("RULE_ENGINE_HTTP_PORT must be a valid port number")?;

        let metrics_port = env::var("RULE_ENGINE_METRICS_PORT")
            .unwrap_or_else(|_| "9092".to_string())
            .parse::<u16>()
            .context("RULE_ENGINE_METRICS_PORT must be a valid port number")?;

        Ok(Self {
            database_url,
            redis_host,
            redis_port,
            redis_password,
            jwt_secret,
            read_count,
            block_time_ms,
            device_service_url,
            webhook_deadline: Duration::from_secs(30),
            device_control_deadline: Duration::from_secs(10),
            http_port,
            metrics_port,
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

    fn base() -> RuleEngineConfig {
        RuleEngineConfig {
            database_url: "postgresql://localhost/test".to_string(),
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            redis_password: None,
            jwt_secret: "secret".to_string(),
            read_count: 10,
            block_time_ms: 2000,
            device_service_url: "http://localhost:8083".to_string(),
            webhook_deadline: Duration::from_secs(30),
            device_control_deadline: Duration::from_secs(10),
            http_port: 8082,
            metrics_port: 9092,
        }
    }

    #[test]
    fn test_redis_url_without_password() {
        assert_eq!(base().redis_url(), "redis://localhost:6379/");
    }

    #[test]
    fn test_redis_url_with_password() {
        let mut config = base();
        config.redis_password = Some("hunter2".to_string());
        assert_eq!(config.redis_url(), "redis://:hunter2@localhost:6379/");
    }
}
