use crate::storage::history::round_to;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct EvaluationRow {
    pub timestamp: DateTime<Utc>,
    pub eval_date: NaiveDate,
    pub mae: Option<f64>,
    pub r2: Option<f64>,
    pub rmse: Option<f64>,
    pub mape: Option<f64>,
}

impl EvaluationRow {
    pub fn rounded(self, places: i32) -> Self {
        let r = |v: Option<f64>| v.map(|v| round_to(v, places));
        Self {
            mae: r(self.mae),
            r2: r(self.r2),
            rmse: r(self.rmse),
            mape: r(self.mape),
            ..self
        }
    }
}

const COLUMNS: &str = "timestamp, eval_date, mae, r2, rmse, mape";

pub async fn latest_evaluation(pool: &sqlx::PgPool) -> anyhow::Result<Option<EvaluationRow>> {
    let sql = format!("SELECT {COLUMNS} FROM model_evaluation ORDER BY timestamp DESC LIMIT 1");
    let row = sqlx::query_as::<_, EvaluationRow>(&sql)
        .persistent(false)
        .fetch_optional(pool)
        .await
        .context("select latest model_evaluation failed")?;
    Ok(row)
}

/// Evaluations whose `timestamp` falls on a day within the (inclusive) bounds.
pub async fn list_evaluations(
    pool: &sqlx::PgPool,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<Vec<EvaluationRow>> {
    let mut qb = sqlx::QueryBuilder::new(format!("SELECT {COLUMNS} FROM model_evaluation WHERE TRUE"));
    if let Some(start) = start {
        qb.push(" AND timestamp::date >= ").push_bind(start);
    }
    if let Some(end) = end {
        qb.push(" AND timestamp::date <= ").push_bind(end);
    }
    qb.push(" ORDER BY timestamp ASC");

    let rows = qb
        .build_query_as::<EvaluationRow>()
        .persistent(false)
        .fetch_all(pool)
        .await
        .context("select model_evaluation failed")?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn rounds_metrics_and_keeps_missing_ones() {
        let row = EvaluationRow {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 3, 0, 30, 0).unwrap(),
            eval_date: NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            mae: Some(12.34567),
            r2: Some(0.81234),
            rmse: None,
            mape: Some(9.87654),
        }
        .rounded(3);

        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!({
                "timestamp": "2025-01-03T00:30:00Z",
                "eval_date": "2025-01-03",
                "mae": 12.346,
                "r2": 0.812,
                "rmse": null,
                "mape": 9.877,
            })
        );
    }
}
