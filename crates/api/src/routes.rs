use aqi_core::domain::CombinedRecord;
use aqi_core::error::PipelineError;
use aqi_core::pipeline::SourceFetcher;
use aqi_core::sources::{ApiKeys, HttpSourceFetcher};
use aqi_core::storage::history::{self, HistoryRow, HISTORY_COLUMNS};
use aqi_core::storage::{evaluation, forecast};
use aqi_core::time::kolkata::format_date;
use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const VIEW_DECIMALS: i32 = 3;

#[derive(Clone)]
pub struct AppState {
    pub pool: Option<PgPool>,
    pub keys: ApiKeys,
    /// Upstream fetch on the server's own keys.
    pub fetcher: Arc<HttpSourceFetcher>,
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/last_update_date", get(last_update_date))
        .route("/api/get_keys", get(get_keys))
        .route("/update_data", post(update_data))
        .route("/api/fetch_current_data", get(fetch_current_data))
        .route("/api/get_evaluation_metrics", get(get_evaluation_metrics))
        .route("/api/get_forecast", get(get_forecast))
        .route("/get_forecast", get(get_forecast))
        .route("/datasets/cleaned_data.csv", get(cleaned_data_csv))
        .route("/api/view-data/:table", get(view_data))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

fn pool(state: &AppState) -> ApiResult<&PgPool> {
    state.pool.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "database unavailable"})),
        )
    })
}

fn internal(err: anyhow::Error) -> ApiError {
    sentry_anyhow::capture_anyhow(&err);
    tracing::error!(error = %format!("{err:#}"), "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": format!("{err:#}")})),
    )
}

fn bad_request(message: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
}

fn upstream_failure(err: anyhow::Error) -> ApiError {
    let stage = PipelineError::find(&err).map(|e| e.stage);
    tracing::warn!(?stage, error = %format!("{err:#}"), "upstream fetch failed");
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({"error": format!("{err:#}")})),
    )
}

async fn last_update_date(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let pool = pool(&state)?;
    let date = history::last_update_date(pool).await.map_err(internal)?;
    Ok(Json(json!({"last_update_date": date.map(format_date)})))
}

async fn get_keys(State(state): State<AppState>) -> Json<ApiKeys> {
    tracing::debug!(keys = ?state.keys, "serving api keys");
    Json(state.keys)
}

async fn update_data(
    State(state): State<AppState>,
    Json(records): Json<Vec<CombinedRecord>>,
) -> ApiResult<Json<Value>> {
    let pool = pool(&state)?;
    let summary = history::upsert_records(pool, &records)
        .await
        .map_err(internal)?;

    tracing::info!(
        run_id = %summary.run_id,
        rows = summary.rows,
        first_date = ?summary.first_date,
        last_date = ?summary.last_date,
        "history updated"
    );
    Ok(Json(json!({
        "message": "Data updated successfully",
        "run": summary,
    })))
}

#[derive(Debug, Default, Deserialize)]
struct FetchParams {
    from_date: Option<String>,
}

/// Live fetch + merge from `from_date` through today. Nothing is stored.
async fn fetch_current_data(
    State(state): State<AppState>,
    Query(params): Query<FetchParams>,
) -> ApiResult<Json<Value>> {
    let checkpoint = parse_bound("from_date", params.from_date.as_deref())?;
    let records = state
        .fetcher
        .fetch_range(checkpoint)
        .await
        .map_err(upstream_failure)?;
    tracing::info!(checkpoint = ?checkpoint, records = records.len(), "served current data");
    Ok(Json(json!({"data": records})))
}

async fn get_evaluation_metrics(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let pool = pool(&state)?;
    match evaluation::latest_evaluation(pool).await.map_err(internal)? {
        Some(row) => Ok(Json(json!({"data": [row]}))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"message": "No evaluation metrics available yet."})),
        )),
    }
}

async fn get_forecast(State(state): State<AppState>) -> ApiResult<Json<Vec<forecast::ForecastRow>>> {
    let pool = pool(&state)?;
    let rows = forecast::latest_forecast(pool).await.map_err(internal)?;
    if rows.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({"message": "No forecast available yet."})),
        ));
    }
    Ok(Json(rows))
}

async fn cleaned_data_csv(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let pool = pool(&state)?;
    let rows = history::list_history(pool, None, None)
        .await
        .map_err(internal)?;
    let body = render_history_csv(&rows).map_err(internal)?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], body))
}

/// Empty cells for missing readings.
pub fn render_history_csv(rows: &[HistoryRow]) -> anyhow::Result<String> {
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(HISTORY_COLUMNS)
        .context("failed to write csv header")?;
    for row in rows {
        let mut record = Vec::with_capacity(HISTORY_COLUMNS.len());
        record.push(format_date(row.date));
        record.extend(
            row.values()
                .iter()
                .map(|v| v.map(|v| v.to_string()).unwrap_or_default()),
        );
        w.write_record(&record)
            .with_context(|| format!("failed to write csv row for {}", row.date))?;
    }
    let bytes = w
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush csv: {e}"))?;
    String::from_utf8(bytes).context("csv output is not utf-8")
}

#[derive(Debug, Default, Deserialize)]
struct RangeParams {
    start_date: Option<String>,
    end_date: Option<String>,
}

fn parse_bound(name: &str, raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| bad_request(format!("{name} must be YYYY-MM-DD (got {s:?})"))),
    }
}

async fn view_data(
    State(state): State<AppState>,
    Path(table): Path<String>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Json<Value>> {
    if !matches!(
        table.as_str(),
        "cleaned_data" | "aqi_forecast" | "model_evaluation"
    ) {
        return Err(bad_request(format!(
            "Table '{table}' is not allowed to be viewed."
        )));
    }
    let start = parse_bound("start_date", params.start_date.as_deref())?;
    let end = parse_bound("end_date", params.end_date.as_deref())?;
    let pool = pool(&state)?;

    let rows = match table.as_str() {
        "cleaned_data" => {
            let rows: Vec<_> = history::list_history(pool, start, end)
                .await
                .map_err(internal)?
                .into_iter()
                .map(|r| r.rounded(VIEW_DECIMALS))
                .collect();
            serde_json::to_value(rows)
        }
        "aqi_forecast" => {
            let rows: Vec<_> = forecast::list_forecasts(pool, start, end)
                .await
                .map_err(internal)?
                .into_iter()
                .map(|r| r.rounded(VIEW_DECIMALS))
                .collect();
            serde_json::to_value(rows)
        }
        _ => {
            let rows: Vec<_> = evaluation::list_evaluations(pool, start, end)
                .await
                .map_err(internal)?
                .into_iter()
                .map(|r| r.rounded(VIEW_DECIMALS))
                .collect();
            serde_json::to_value(rows)
        }
    };

    rows.map(Json)
        .map_err(|e| internal(anyhow::Error::new(e).context("failed to encode rows")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_core::sources::visual_crossing::WeatherClient;
    use aqi_core::sources::waqi::PollutantClient;
    use axum::http::HeaderValue;
    use axum_test::TestServer;

    // Nothing listens on the discard port; tests that reach upstream fail loudly.
    const UNREACHABLE: &str = "http://127.0.0.1:9";

    fn degraded() -> TestServer {
        let keys = ApiKeys {
            weather: Some("w-key".to_string()),
            pollutant: None,
        };
        let http = reqwest::Client::new();
        let fetcher = HttpSourceFetcher::new(
            Arc::new(keys.clone()),
            PollutantClient::new(http.clone(), UNREACHABLE, "delhi"),
            WeatherClient::new(http, UNREACHABLE, "Delhi"),
        );
        let app = router(AppState {
            pool: None,
            keys,
            fetcher: Arc::new(fetcher),
        });
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn health_and_keys_work_without_database() {
        let server = degraded();

        let response = server.get("/healthz").await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.text(), "ok");

        let response = server.get("/api/get_keys").await;
        response.assert_status(StatusCode::OK);
        assert_eq!(
            response.json::<Value>(),
            json!({"WEATHER_KEY": "w-key", "POLLUTANT_KEY": null})
        );
    }

    #[tokio::test]
    async fn database_routes_are_unavailable_in_degraded_mode() {
        let server = degraded();
        for uri in [
            "/api/last_update_date",
            "/api/get_forecast",
            "/get_forecast",
            "/api/get_evaluation_metrics",
            "/datasets/cleaned_data.csv",
            "/api/view-data/cleaned_data",
            "/api/view-data/model_evaluation?start_date=2025-01-01",
        ] {
            let response = server.get(uri).await;
            assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            assert_eq!(response.json::<Value>()["error"], "database unavailable");
        }

        let response = server.post("/update_data").json(&json!([])).await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn view_data_rejects_unknown_tables_and_bad_dates() {
        let server = degraded();

        let response = server.get("/api/view-data/raw_data").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["error"],
            "Table 'raw_data' is not allowed to be viewed."
        );

        let response = server
            .get("/api/view-data/cleaned_data?start_date=01-02-2025")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn current_data_fails_on_missing_key_before_any_upstream_call() {
        let server = degraded();

        let response = server
            .get("/api/fetch_current_data?from_date=2025-01-01")
            .await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        let error = response.json::<Value>()["error"].as_str().unwrap().to_string();
        assert!(error.contains("POLLUTANT_KEY missing"), "{error}");
    }

    #[tokio::test]
    async fn current_data_after_today_is_empty() {
        let server = degraded();
        let future = chrono::Utc::now().date_naive() + chrono::Days::new(30);

        let response = server
            .get(&format!("/api/fetch_current_data?from_date={future}"))
            .await;
        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({"data": []}));

        let response = server
            .get("/api/fetch_current_data?from_date=yesterday")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_headers_are_present() {
        let server = degraded();
        let response = server
            .get("/api/get_keys")
            .add_header(
                header::ORIGIN,
                HeaderValue::from_static("http://localhost:5173"),
            )
            .await;
        assert!(response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn csv_leaves_missing_readings_blank() {
        let record = CombinedRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            pollutant: aqi_core::domain::PollutantSnapshot {
                pm10: Some(95.5),
                aqi: Some(162.0),
                ..Default::default()
            },
            weather: aqi_core::domain::WeatherReadings {
                pressure: Some(1017.2),
                ..Default::default()
            },
        };
        let csv = render_history_csv(&[HistoryRow::from(&record)]).unwrap();
        let mut lines = csv.lines();

        assert_eq!(lines.next().unwrap(), HISTORY_COLUMNS.join(","));
        let row: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row.len(), HISTORY_COLUMNS.len());
        assert_eq!(row[0], "2025-01-01");
        assert_eq!(row[1], "");
        assert_eq!(row[2], "95.5");
        assert_eq!(row[7], "162");
        assert_eq!(row[19], "1017.2");
        assert!(lines.next().is_none());
    }
}
