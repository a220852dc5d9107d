pub mod backend;
pub mod chart;
pub mod domain;
pub mod error;
mod http;
pub mod pipeline;
pub mod sources;
pub mod storage;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub backend_base_url: Option<String>,
        pub weather_key: Option<String>,
        pub pollutant_key: Option<String>,
        pub http_timeout_secs: u64,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let http_timeout_secs = match std::env::var("AQI_HTTP_TIMEOUT_SECS") {
                Ok(s) => s
                    .trim()
                    .parse::<u64>()
                    .with_context(|| format!("AQI_HTTP_TIMEOUT_SECS must be an integer (got {s:?})"))?,
                Err(_) => DEFAULT_HTTP_TIMEOUT_SECS,
            };

            Ok(Self {
                database_url: non_empty_var("DATABASE_URL"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                backend_base_url: non_empty_var("AQI_BACKEND_URL"),
                weather_key: non_empty_var("WEATHER_KEY"),
                pollutant_key: non_empty_var("POLLUTANT_KEY"),
                http_timeout_secs,
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_backend_base_url(&self) -> anyhow::Result<&str> {
            self.backend_base_url
                .as_deref()
                .context("AQI_BACKEND_URL is required")
        }

        /// Shared reqwest client for every outbound call of the pipeline.
        pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
            reqwest::Client::builder()
                .timeout(Duration::from_secs(self.http_timeout_secs))
                .build()
                .context("failed to build http client")
        }
    }

    /// Reads an optional env var with a fallback, ignoring blank values.
    pub fn var_or(key: &str, default: &str) -> String {
        non_empty_var(key).unwrap_or_else(|| default.to_string())
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }
}
