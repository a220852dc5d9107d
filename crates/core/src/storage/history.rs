use crate::domain::{CombinedRecord, PollutantSnapshot, WeatherReadings};
use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

const DEFAULT_UPSERT_BATCH: usize = 200;

/// Flat row of `cleaned_data`. Weather `pressure` is stored as `sealevelpressure`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct HistoryRow {
    pub date: NaiveDate,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub o3: Option<f64>,
    pub aqi: Option<f64>,
    pub tempmax: Option<f64>,
    pub tempmin: Option<f64>,
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
    pub dew: Option<f64>,
    pub windspeed: Option<f64>,
    pub winddir: Option<f64>,
    pub windgust: Option<f64>,
    pub precip: Option<f64>,
    pub cloudcover: Option<f64>,
    pub visibility: Option<f64>,
    pub sealevelpressure: Option<f64>,
}

pub const HISTORY_COLUMNS: [&str; 20] = [
    "date",
    "pm25",
    "pm10",
    "co",
    "no2",
    "so2",
    "o3",
    "aqi",
    "tempmax",
    "tempmin",
    "temp",
    "humidity",
    "dew",
    "windspeed",
    "winddir",
    "windgust",
    "precip",
    "cloudcover",
    "visibility",
    "sealevelpressure",
];

impl From<&CombinedRecord> for HistoryRow {
    fn from(r: &CombinedRecord) -> Self {
        let p = &r.pollutant;
        let w = &r.weather;
        Self {
            date: r.date,
            pm25: p.pm25,
            pm10: p.pm10,
            co: p.co,
            no2: p.no2,
            so2: p.so2,
            o3: p.o3,
            aqi: p.aqi,
            tempmax: w.tempmax,
            tempmin: w.tempmin,
            temp: w.temp,
            humidity: w.humidity,
            dew: w.dew,
            windspeed: w.windspeed,
            winddir: w.winddir,
            windgust: w.windgust,
            precip: w.precip,
            cloudcover: w.cloudcover,
            visibility: w.visibility,
            sealevelpressure: w.pressure,
        }
    }
}

impl HistoryRow {
    pub fn into_record(self) -> CombinedRecord {
        CombinedRecord {
            date: self.date,
            pollutant: PollutantSnapshot {
                pm25: self.pm25,
                pm10: self.pm10,
                co: self.co,
                no2: self.no2,
                so2: self.so2,
                o3: self.o3,
                aqi: self.aqi,
            },
            weather: WeatherReadings {
                tempmax: self.tempmax,
                tempmin: self.tempmin,
                temp: self.temp,
                humidity: self.humidity,
                dew: self.dew,
                windspeed: self.windspeed,
                winddir: self.winddir,
                windgust: self.windgust,
                precip: self.precip,
                cloudcover: self.cloudcover,
                visibility: self.visibility,
                pressure: self.sealevelpressure,
            },
        }
    }

    /// Values in column order, date excluded.
    pub fn values(&self) -> [Option<f64>; 19] {
        [
            self.pm25,
            self.pm10,
            self.co,
            self.no2,
            self.so2,
            self.o3,
            self.aqi,
            self.tempmax,
            self.tempmin,
            self.temp,
            self.humidity,
            self.dew,
            self.windspeed,
            self.winddir,
            self.windgust,
            self.precip,
            self.cloudcover,
            self.visibility,
            self.sealevelpressure,
        ]
    }

    pub fn rounded(self, places: i32) -> Self {
        let r = |v: Option<f64>| v.map(|v| round_to(v, places));
        Self {
            date: self.date,
            pm25: r(self.pm25),
            pm10: r(self.pm10),
            co: r(self.co),
            no2: r(self.no2),
            so2: r(self.so2),
            o3: r(self.o3),
            aqi: r(self.aqi),
            tempmax: r(self.tempmax),
            tempmin: r(self.tempmin),
            temp: r(self.temp),
            humidity: r(self.humidity),
            dew: r(self.dew),
            windspeed: r(self.windspeed),
            winddir: r(self.winddir),
            windgust: r(self.windgust),
            precip: r(self.precip),
            cloudcover: r(self.cloudcover),
            visibility: r(self.visibility),
            sealevelpressure: r(self.sealevelpressure),
        }
    }
}

pub fn round_to(v: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (v * scale).round() / scale
}

/// One row per date, later submissions winning, sorted by date.
///
/// A single `INSERT .. ON CONFLICT DO UPDATE` cannot touch the same key twice.
pub fn latest_per_date(records: &[CombinedRecord]) -> Vec<HistoryRow> {
    let mut by_date: BTreeMap<NaiveDate, HistoryRow> = BTreeMap::new();
    for r in records {
        by_date.insert(r.date, HistoryRow::from(r));
    }
    by_date.into_values().collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertSummary {
    pub run_id: Uuid,
    pub rows: usize,
    pub affected: u64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

/// Postgres caps a statement at 65535 bind parameters; each row binds one per column.
pub const MAX_UPSERT_BATCH: usize = u16::MAX as usize / HISTORY_COLUMNS.len();

fn upsert_batch_size() -> anyhow::Result<usize> {
    parse_batch_size(std::env::var("HISTORY_UPSERT_BATCH").ok().as_deref())
}

fn parse_batch_size(raw: Option<&str>) -> anyhow::Result<usize> {
    let size = match raw {
        Some(s) => s
            .trim()
            .parse::<usize>()
            .with_context(|| format!("HISTORY_UPSERT_BATCH must be an integer (got {s:?})"))?,
        None => DEFAULT_UPSERT_BATCH,
    };
    anyhow::ensure!(size >= 1, "HISTORY_UPSERT_BATCH must be >= 1");
    anyhow::ensure!(
        size <= MAX_UPSERT_BATCH,
        "HISTORY_UPSERT_BATCH must be <= {MAX_UPSERT_BATCH} (got {size})"
    );
    Ok(size)
}

/// Upserts submitted records by date and records the run, in one transaction.
pub async fn upsert_records(
    pool: &sqlx::PgPool,
    records: &[CombinedRecord],
) -> anyhow::Result<UpsertSummary> {
    let rows = latest_per_date(records);
    let chunk_size = upsert_batch_size()?;

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut affected: u64 = 0;
    for (batch_idx, chunk) in rows.chunks(chunk_size).enumerate() {
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(format!(
            "INSERT INTO cleaned_data ({}) ",
            HISTORY_COLUMNS.join(", ")
        ));
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.date);
            for v in row.values() {
                b.push_bind(v);
            }
        });
        let updates = HISTORY_COLUMNS[1..]
            .iter()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        qb.push(format!(" ON CONFLICT (date) DO UPDATE SET {updates}"));

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert cleaned_data failed")?;
        affected += res.rows_affected();

        tracing::debug!(
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "cleaned_data batch upsert"
        );
    }

    let run_id = Uuid::new_v4();
    let first_date = rows.first().map(|r| r.date);
    let last_date = rows.last().map(|r| r.date);
    sqlx::query(
        "INSERT INTO update_runs (id, row_count, first_date, last_date) VALUES ($1, $2, $3, $4)",
    )
    .persistent(false)
    .bind(run_id)
    .bind(rows.len() as i32)
    .bind(first_date)
    .bind(last_date)
    .execute(&mut *tx)
    .await
    .context("insert update_runs failed")?;

    tx.commit().await.context("commit transaction failed")?;

    Ok(UpsertSummary {
        run_id,
        rows: rows.len(),
        affected,
        first_date,
        last_date,
    })
}

pub async fn last_update_date(pool: &sqlx::PgPool) -> anyhow::Result<Option<NaiveDate>> {
    let date: Option<NaiveDate> = sqlx::query_scalar("SELECT MAX(date) FROM cleaned_data")
        .persistent(false)
        .fetch_one(pool)
        .await
        .context("select max(date) from cleaned_data failed")?;
    Ok(date)
}

/// History rows in date order, optionally bounded (inclusive) on either side.
pub async fn list_history(
    pool: &sqlx::PgPool,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<Vec<HistoryRow>> {
    let mut qb = sqlx::QueryBuilder::new(format!(
        "SELECT {} FROM cleaned_data WHERE TRUE",
        HISTORY_COLUMNS.join(", ")
    ));
    if let Some(start) = start {
        qb.push(" AND date >= ").push_bind(start);
    }
    if let Some(end) = end {
        qb.push(" AND date <= ").push_bind(end);
    }
    qb.push(" ORDER BY date ASC");

    let rows = qb
        .build_query_as::<HistoryRow>()
        .persistent(false)
        .fetch_all(pool)
        .await
        .context("select cleaned_data failed")?;
    Ok(rows)
}
