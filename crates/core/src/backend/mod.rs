use crate::config::{var_or, Settings};
use crate::domain::{CombinedRecord, ForecastPoint};
use crate::error::PipelineError;
use crate::http::{send_json, send_text};
use crate::pipeline::{CheckpointSource, ForecastSource, TableSource, UploadReceipt, Uploader};
use crate::sources::{ApiKeys, KeySource};
use crate::time::kolkata::parse_date_lenient;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_FORECAST_PATH: &str = "/api/get_forecast";

/// Client for the dashboard backend: checkpoint, key proxy, upload, forecast
/// and the raw CSV view.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    forecast_path: String,
}

#[derive(Debug, Deserialize)]
struct LastUpdate {
    #[serde(default)]
    last_update_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ForecastBody {
    Sequence(Vec<ForecastRow>),
    Mapping(BTreeMap<String, f64>),
}

#[derive(Debug, Deserialize)]
struct ForecastRow {
    predicted_date: String,
    predicted_aqi: f64,
}

impl BackendClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        forecast_path: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            forecast_path: forecast_path.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(
            settings.http_client()?,
            settings.require_backend_base_url()?,
            var_or("AQI_FORECAST_PATH", DEFAULT_FORECAST_PATH),
        ))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn fetch_checkpoint(&self) -> anyhow::Result<Option<NaiveDate>> {
        let req = self.http.get(self.url("/api/last_update_date"));
        let body = send_json::<LastUpdate>("last update date", req).await?;
        Ok(match body.last_update_date.as_deref() {
            Some(raw) => {
                let parsed = parse_date_lenient(raw);
                if parsed.is_none() {
                    tracing::warn!(raw, "unparseable last_update_date");
                }
                parsed
            }
            None => None,
        })
    }

    async fn fetch_forecast(&self) -> anyhow::Result<Vec<ForecastPoint>> {
        let req = self.http.get(self.url(&self.forecast_path));
        let body = send_json::<Value>("forecast", req).await?;
        parse_forecast(body)
    }
}

/// Decodes either forecast shape. An array keeps its order; a date→value
/// object has none, so it is sorted by date.
pub fn parse_forecast(body: Value) -> anyhow::Result<Vec<ForecastPoint>> {
    let body: ForecastBody = serde_json::from_value(body)
        .map_err(|e| PipelineError::shape("forecast", e.to_string()))?;

    let date = |raw: &str| {
        parse_date_lenient(raw)
            .ok_or_else(|| PipelineError::shape("forecast", format!("bad predicted date {raw:?}")))
    };

    match body {
        ForecastBody::Sequence(rows) => rows
            .into_iter()
            .map(|row| {
                Ok(ForecastPoint {
                    date: date(&row.predicted_date)?,
                    value: row.predicted_aqi,
                })
            })
            .collect(),
        ForecastBody::Mapping(map) => {
            let mut points = map
                .iter()
                .map(|(raw, value)| {
                    Ok(ForecastPoint {
                        date: date(raw)?,
                        value: *value,
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            points.sort_by_key(|p| p.date);
            Ok(points)
        }
    }
}

#[async_trait::async_trait]
impl KeySource for BackendClient {
    async fn api_keys(&self) -> anyhow::Result<ApiKeys> {
        let req = self.http.get(self.url("/api/get_keys"));
        send_json::<ApiKeys>("api keys", req).await
    }
}

#[async_trait::async_trait]
impl CheckpointSource for BackendClient {
    async fn checkpoint(&self) -> Option<NaiveDate> {
        match self.fetch_checkpoint().await {
            Ok(date) => date,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to resolve checkpoint; fetching open range");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl Uploader for BackendClient {
    async fn upload(&self, records: &[CombinedRecord]) -> anyhow::Result<UploadReceipt> {
        let req = self.http.post(self.url("/update_data")).json(records);
        let body = send_json::<Value>("upload", req).await?;
        Ok(UploadReceipt { body })
    }
}

#[async_trait::async_trait]
impl ForecastSource for BackendClient {
    async fn forecast(&self) -> Option<Vec<ForecastPoint>> {
        match self.fetch_forecast().await {
            Ok(points) => {
                tracing::debug!(points = points.len(), "forecast fetched");
                Some(points)
            }
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to fetch forecast");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl TableSource for BackendClient {
    async fn cleaned_csv(&self) -> anyhow::Result<String> {
        let req = self.http.get(self.url("/datasets/cleaned_data.csv"));
        send_text("csv view", req).await
    }
}
