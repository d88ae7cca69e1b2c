/*!
 * Configuration Module for the Device Service
 */

use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct DeviceServiceConfig {
    pub database_url: String,
    pub jwt_secret: String,

    /// Expiry of the host-client bearer credential minted on registration,
    /// in seconds (§4.5 "long expiry").
    pub client_token_ttl_seconds: i64,

    pub http_port: u16,
    pub metrics_port: u16,
}

impl DeviceServiceConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET not set")?;

        let client_token_ttl_seconds = env::var("DEVICE_CLIENT_TOKEN_TTL_SECONDS")
            .unwrap_or_else(|_| "31536000".to_string()) // 1 year
            .parse::<i64>()
            .context("DEVICE_CLIENT_TOKEN_TTL_SECONDS must be a valid number")?;

        let http_port = env::var("DEVICE_SERVICE_HTTP_PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse::<u16>()
            .context("DEVICE_SERVICE_HTTP_PORT must be a valid port number")?;

        let metrics_port = env::var("DEVICE_SERVICE_METRICS_PORT")
            .unwrap_or_else(|_| "9093".to_string())
            .parse::<u16>()
            .context("DEVICE_SERVICE_METRICS_PORT must be a valid port number")?;

        Ok(Self {
            database_url,
            jwt_secret,
            client_token_ttl_seconds,
            http_port,
            metrics_port,
        })
    }
}
