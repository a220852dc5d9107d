use crate::config::Settings;
use crate::domain::{merge, CombinedRecord};
use crate::error::PipelineError;
use crate::pipeline::SourceFetcher;
use crate::sources::visual_crossing::{ensure_unique_dates, WeatherClient};
use crate::sources::waqi::PollutantClient;
use crate::sources::KeySource;
use crate::time::kolkata::FetchRange;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Keys from the backend, then the pollutant snapshot and the weather series,
/// merged per day. Any failing call aborts the whole fetch.
pub struct HttpSourceFetcher {
    keys: Arc<dyn KeySource>,
    pollutant: PollutantClient,
    weather: WeatherClient,
}

impl HttpSourceFetcher {
    pub fn new(keys: Arc<dyn KeySource>, pollutant: PollutantClient, weather: WeatherClient) -> Self {
        Self {
            keys,
            pollutant,
            weather,
        }
    }

    pub fn from_settings(settings: &Settings, keys: Arc<dyn KeySource>) -> anyhow::Result<Self> {
        Ok(Self::new(
            keys,
            PollutantClient::from_settings(settings)?,
            WeatherClient::from_settings(settings)?,
        ))
    }

    pub async fn fetch_range_at(
        &self,
        checkpoint: Option<NaiveDate>,
        now_utc: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CombinedRecord>> {
        let range = FetchRange::ending_today(checkpoint, now_utc)?;
        if range.is_empty() {
            tracing::info!(
                start = %range.start_param(),
                end = %range.end_param(),
                "checkpoint is after today; nothing to fetch"
            );
            return Ok(Vec::new());
        }
        tracing::info!(from = %range.start_param(), to = %range.end_param(), "fetching source data");

        let keys = self.keys.api_keys().await?;
        let weather_key = keys
            .weather
            .ok_or_else(|| PipelineError::shape("api keys", "WEATHER_KEY missing"))?;
        let pollutant_key = keys
            .pollutant
            .ok_or_else(|| PipelineError::shape("api keys", "POLLUTANT_KEY missing"))?;

        let (snapshot, days) = tokio::try_join!(
            self.pollutant.current_snapshot(&pollutant_key),
            self.weather.daily_range(&range, &weather_key),
        )?;

        ensure_unique_dates(&days)?;
        Ok(merge(&days, &snapshot))
    }
}

#[async_trait::async_trait]
impl SourceFetcher for HttpSourceFetcher {
    async fn fetch_range(&self, checkpoint: Option<NaiveDate>) -> anyhow::Result<Vec<CombinedRecord>> {
        self.fetch_range_at(checkpoint, Utc::now()).await
    }
}
