use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Daily meteorological readings. Every field is nullable upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherReadings {
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
    pub pressure: Option<f64>,
}

/// One element of the weather timeline's `days` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherDay {
    #[serde(rename = "datetime")]
    pub date: NaiveDate,
    #[serde(flatten)]
    pub readings: WeatherReadings,
}

/// Current-moment pollutant reading. `None` means the station reported no
/// value for that channel, which is not the same as a zero concentration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollutantSnapshot {
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub co: Option<f64>,
    pub no2: Option<f64>,
    pub so2: Option<f64>,
    pub o3: Option<f64>,
    #[serde(rename = "AQI")]
    pub aqi: Option<f64>,
}

/// Upload payload element: one calendar day of weather joined with the
/// pollutant snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedRecord {
    pub date: NaiveDate,
    pub pollutant: PollutantSnapshot,
    pub weather: WeatherReadings,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    #[serde(rename = "predicted_date")]
    pub date: NaiveDate,
    #[serde(rename = "predicted_aqi")]
    pub value: f64,
}
