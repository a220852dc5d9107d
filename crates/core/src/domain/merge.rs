use crate::domain::record::{CombinedRecord, PollutantSnapshot, WeatherDay};

/// Joins each weather day with the pollutant snapshot.
///
/// The pollutant feed only exposes the current reading, so every day of a
/// multi-day backfill carries the same snapshot.
pub fn merge(days: &[WeatherDay], snapshot: &PollutantSnapshot) -> Vec<CombinedRecord> {
    days.iter()
        .map(|day| CombinedRecord {
            date: day.date,
            pollutant: snapshot.clone(),
            weather: day.readings.clone(),
        })
        .collect()
}
