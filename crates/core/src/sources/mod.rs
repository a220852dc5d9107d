pub mod fetcher;
pub mod visual_crossing;
pub mod waqi;

pub use fetcher::HttpSourceFetcher;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upstream credentials, proxied by the backend so they never ship with the client.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(rename = "WEATHER_KEY")]
    pub weather: Option<String>,
    #[serde(rename = "POLLUTANT_KEY")]
    pub pollutant: Option<String>,
}

impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |k: &Option<String>| if k.is_some() { "<set>" } else { "<missing>" };
        f.debug_struct("ApiKeys")
            .field("weather", &redact(&self.weather))
            .field("pollutant", &redact(&self.pollutant))
            .finish()
    }
}

#[async_trait::async_trait]
pub trait KeySource: Send + Sync {
    async fn api_keys(&self) -> anyhow::Result<ApiKeys>;
}

/// Keys already in hand, e.g. the backend's own environment.
#[async_trait::async_trait]
impl KeySource for ApiKeys {
    async fn api_keys(&self) -> anyhow::Result<ApiKeys> {
        Ok(self.clone())
    }
}
