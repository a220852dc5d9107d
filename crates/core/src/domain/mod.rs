pub mod merge;
pub mod record;

pub use merge::merge;
pub use record::{CombinedRecord, ForecastPoint, PollutantSnapshot, WeatherDay, WeatherReadings};
