use crate::config::{var_or, Settings};
use crate::domain::WeatherDay;
use crate::error::PipelineError;
use crate::http::send_json;
use crate::time::kolkata::FetchRange;
use anyhow::Context;
use reqwest::Url;
use serde::Deserialize;

const DEFAULT_BASE_URL: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline";
const DEFAULT_LOCATION: &str = "INDIRA GANDHI INTERNATIONAL, IN";
const STAGE: &str = "weather timeline";

/// Client for the Visual Crossing timeline API (per-day series).
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimelineResponse {
    resolved_address: Option<String>,
    days: Vec<WeatherDay>,
}

impl WeatherClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            location: location.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(
            settings.http_client()?,
            var_or("VISUALCROSSING_BASE_URL", DEFAULT_BASE_URL),
            var_or("VISUALCROSSING_LOCATION", DEFAULT_LOCATION),
        ))
    }

    /// `{base}/{location}/{start}/{end}?unitGroup=metric&include=days&key=..&contentType=json`
    ///
    /// An open range keeps its empty start segment; the API then falls back to
    /// its default window.
    pub fn timeline_url(&self, range: &FetchRange, key: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .with_context(|| format!("invalid weather base url: {}", self.base_url))?;

        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("weather base url cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .push(&self.location)
            .push(&range.start_param())
            .push(&range.end_param());

        url.query_pairs_mut()
            .append_pair("unitGroup", "metric")
            .append_pair("include", "days")
            .append_pair("key", key)
            .append_pair("contentType", "json");

        Ok(url)
    }

    pub async fn daily_range(&self, range: &FetchRange, key: &str) -> anyhow::Result<Vec<WeatherDay>> {
        let url = self.timeline_url(range, key)?;
        let body = send_json::<TimelineResponse>(STAGE, self.http.get(url)).await?;

        tracing::debug!(
            start = %range.start_param(),
            end = %range.end_param(),
            resolved_address = body.resolved_address.as_deref().unwrap_or("unknown"),
            days = body.days.len(),
            "weather series fetched"
        );
        Ok(body.days)
    }
}

/// Rejects a series that repeats a calendar day.
pub fn ensure_unique_dates(days: &[WeatherDay]) -> anyhow::Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for day in days {
        if !seen.insert(day.date) {
            return Err(PipelineError::shape(STAGE, format!("duplicate day {}", day.date)).into());
        }
    }
    Ok(())
}
