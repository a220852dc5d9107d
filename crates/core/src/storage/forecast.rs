use crate::domain::ForecastPoint;
use crate::storage::history::round_to;
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ForecastRow {
    pub forecast_date: NaiveDate,
    pub predicted_date: NaiveDate,
    pub predicted_aqi: f64,
    pub model_name: String,
    pub location: String,
}

impl ForecastRow {
    pub fn point(&self) -> ForecastPoint {
        ForecastPoint {
            date: self.predicted_date,
            value: self.predicted_aqi,
        }
    }

    pub fn rounded(self, places: i32) -> Self {
        Self {
            predicted_aqi: round_to(self.predicted_aqi, places),
            ..self
        }
    }
}

const COLUMNS: &str = "forecast_date, predicted_date, predicted_aqi, model_name, location";

/// Rows of the most recent forecast run, ordered by predicted date.
pub async fn latest_forecast(pool: &sqlx::PgPool) -> anyhow::Result<Vec<ForecastRow>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM aqi_forecast \
         WHERE forecast_date = (SELECT MAX(forecast_date) FROM aqi_forecast) \
         ORDER BY predicted_date ASC"
    );
    let rows = sqlx::query_as::<_, ForecastRow>(&sql)
        .persistent(false)
        .fetch_all(pool)
        .await
        .context("select latest aqi_forecast failed")?;
    Ok(rows)
}

/// Forecast rows filtered (inclusive) on `forecast_date`.
pub async fn list_forecasts(
    pool: &sqlx::PgPool,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<Vec<ForecastRow>> {
    let mut qb = sqlx::QueryBuilder::new(format!("SELECT {COLUMNS} FROM aqi_forecast WHERE TRUE"));
    if let Some(start) = start {
        qb.push(" AND forecast_date >= ").push_bind(start);
    }
    if let Some(end) = end {
        qb.push(" AND forecast_date <= ").push_bind(end);
    }
    qb.push(" ORDER BY forecast_date ASC, predicted_date ASC");

    let rows = qb
        .build_query_as::<ForecastRow>()
        .persistent(false)
        .fetch_all(pool)
        .await
        .context("select aqi_forecast failed")?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_client_forecast_row() {
        let row = ForecastRow {
            forecast_date: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            predicted_date: NaiveDate::from_ymd_opt(2025, 1, 4).unwrap(),
            predicted_aqi: 171.23456,
            model_name: "XGBoost_V1".to_string(),
            location: "Delhi".to_string(),
        }
        .rounded(3);

        let v = serde_json::to_value(&row).unwrap();
        let point: ForecastPoint = serde_json::from_value(v).unwrap();
        assert_eq!(point, row.point());
        assert_eq!(point.value, 171.235);
    }
}
