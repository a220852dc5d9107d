use crate::config::{var_or, Settings};
use crate::domain::PollutantSnapshot;
use crate::error::PipelineError;
use crate::http::send_json;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

const DEFAULT_BASE_URL: &str = "https://api.waqi.info";
const DEFAULT_STATION: &str = "@10124";
const STAGE: &str = "pollutant feed";

/// Client for the WAQI station feed (single current reading, no history).
#[derive(Debug, Clone)]
pub struct PollutantClient {
    http: reqwest::Client,
    base_url: String,
    station: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedResponse {
    pub status: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    // Numeric index, or "-" when the station has no current value.
    #[serde(default)]
    aqi: Value,
    #[serde(default)]
    iaqi: BTreeMap<String, Reading>,
}

#[derive(Debug, Deserialize)]
struct Reading {
    #[serde(default)]
    v: Value,
}

impl PollutantClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, station: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            station: station.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self::new(
            settings.http_client()?,
            var_or("WAQI_BASE_URL", DEFAULT_BASE_URL),
            var_or("WAQI_STATION", DEFAULT_STATION),
        ))
    }

    pub fn feed_url(&self) -> String {
        format!("{}/feed/{}/", self.base_url.trim_end_matches('/'), self.station)
    }

    pub async fn current_snapshot(&self, token: &str) -> anyhow::Result<PollutantSnapshot> {
        let req = self.http.get(self.feed_url()).query(&[("token", token)]);
        let feed = send_json::<FeedResponse>(STAGE, req).await?;
        let snapshot = parse_feed(feed)?;
        tracing::debug!(station = %self.station, aqi = ?snapshot.aqi, "pollutant snapshot fetched");
        Ok(snapshot)
    }
}

pub fn parse_feed(feed: FeedResponse) -> anyhow::Result<PollutantSnapshot> {
    if feed.status != "ok" {
        return Err(PipelineError::shape(
            STAGE,
            format!("feed status {:?}: {}", feed.status, feed.data),
        )
        .into());
    }

    let data = serde_json::from_value::<FeedData>(feed.data)
        .map_err(|e| PipelineError::shape(STAGE, format!("unexpected feed data: {e}")))?;

    let channel = |name: &str| data.iaqi.get(name).and_then(|r| r.v.as_f64());

    Ok(PollutantSnapshot {
        pm25: channel("pm25"),
        pm10: channel("pm10"),
        co: channel("co"),
        no2: channel("no2"),
        so2: channel("so2"),
        o3: channel("o3"),
        aqi: data.aqi.as_f64(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn feed(v: Value) -> FeedResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn missing_channel_maps_to_none() {
        let snapshot = parse_feed(feed(json!({
            "status": "ok",
            "data": {
                "aqi": 174,
                "iaqi": {
                    "pm10": {"v": 0},
                    "no2": {"v": 12.4},
                    "o3": {"v": 3.1},
                    "t": {"v": 14}
                }
            }
        })))
        .unwrap();

        assert_eq!(snapshot.pm25, None);
        assert_eq!(snapshot.pm10, Some(0.0));
        assert_eq!(snapshot.no2, Some(12.4));
        assert_eq!(snapshot.co, None);
        assert_eq!(snapshot.aqi, Some(174.0));
    }

    #[test]
    fn placeholder_aqi_is_null() {
        let snapshot = parse_feed(feed(json!({
            "status": "ok",
            "data": {"aqi": "-", "iaqi": {}}
        })))
        .unwrap();
        assert_eq!(snapshot, PollutantSnapshot::default());
    }

    #[test]
    fn error_status_is_shape_failure() {
        let err = parse_feed(feed(json!({"status": "error", "data": "Invalid key"}))).unwrap_err();
        let diag = PipelineError::find(&err).unwrap();
        assert_eq!(diag.kind, crate::error::FailureKind::Shape);
        assert!(diag.detail.contains("Invalid key"));
    }

    #[tokio::test]
    async fn requests_station_feed_with_token() {
        let app = Router::new().route(
            "/feed/:station/",
            get(
                |Path(station): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(station, "@10124");
                    assert_eq!(q.get("token").map(String::as_str), Some("p-key"));
                    Json(json!({"status": "ok", "data": {"aqi": 90, "iaqi": {"pm25": {"v": 90}}}}))
                },
            ),
        );
        let base = crate::testing::serve(app).await;

        let client = PollutantClient::new(reqwest::Client::new(), base, "@10124");
        let snapshot = client.current_snapshot("p-key").await.unwrap();
        assert_eq!(snapshot.pm25, Some(90.0));
        assert_eq!(snapshot.aqi, Some(90.0));
    }
}
