//! Process configuration from environment variables.

use anyhow::Context;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// API key for the external trading service.
    pub api_key: String,
    /// Base URL of the external service's request API.
    pub service_url: String,
    /// URL of the external service's event feed.
    pub feed_url: String,
}

const DEFAULT_SERVICE_URL: &str = "https://api.trade.example.com/v1";
const DEFAULT_FEED_URL: &str = "https://feed.trade.example.com/v1/events";

impl Config {
    /// Read configuration from the environment.
    ///
    /// `DATABASE_URL` and `API_KEY` are required; the service endpoints
    /// default to production and can be overridden for staging/dev.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let api_key = std::env::var("API_KEY").context("API_KEY must be set")?;

        let service_url = std::env::var("SERVICE_URL").unwrap_or_else(|_| {
            tracing::debug!("SERVICE_URL not set; using default");
            DEFAULT_SERVICE_URL.to_string()
        });
        let feed_url = std::env::var("FEED_URL").unwrap_or_else(|_| {
            tracing::debug!("FEED_URL not set; using default");
            DEFAULT_FEED_URL.to_string()
        });

        Ok(Self {
            database_url,
            api_key,
            service_url,
            feed_url,
        })
    }
}
