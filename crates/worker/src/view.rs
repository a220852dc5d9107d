use aqi_core::domain::CombinedRecord;
use aqi_core::pipeline::DashboardView;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Terminal rendition of the dashboard: one card per fetched day, the raw
/// table printed verbatim, and a status line that is optionally mirrored to a
/// file for whatever polls it.
pub struct TerminalView {
    out: Mutex<Box<dyn Write + Send>>,
    status_path: Option<PathBuf>,
}

impl TerminalView {
    pub fn new(out: Box<dyn Write + Send>, status_path: Option<PathBuf>) -> Self {
        Self {
            out: Mutex::new(out),
            status_path,
        }
    }

    pub fn stdout(status_path: Option<PathBuf>) -> Self {
        Self::new(Box::new(std::io::stdout()), status_path)
    }

    fn emit(&self, text: &str) {
        let Ok(mut out) = self.out.lock() else {
            tracing::warn!("terminal view poisoned; dropping output");
            return;
        };
        if let Err(err) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
            tracing::warn!(error = %err, "failed to write to terminal");
        }
    }
}

fn reading(v: Option<f64>, unit: &str) -> String {
    match v {
        Some(v) => format!("{v}{unit}"),
        None => "N/A".to_string(),
    }
}

pub fn record_card(r: &CombinedRecord) -> String {
    let p = &r.pollutant;
    let w = &r.weather;
    format!(
        "{date}\n  AQI {aqi} | PM2.5 {pm25} | PM10 {pm10} | CO {co} | NO2 {no2} | SO2 {so2} | O3 {o3}\n  \
         Temp {temp} (max {tempmax}, min {tempmin}) | Humidity {humidity} | Dew {dew}\n  \
         Wind {windspeed} from {winddir} (gust {windgust}) | Precip {precip} | Cloud {cloudcover} | \
         Visibility {visibility} | Pressure {pressure}\n",
        date = r.date,
        aqi = reading(p.aqi, ""),
        pm25 = reading(p.pm25, ""),
        pm10 = reading(p.pm10, ""),
        co = reading(p.co, ""),
        no2 = reading(p.no2, ""),
        so2 = reading(p.so2, ""),
        o3 = reading(p.o3, ""),
        temp = reading(w.temp, "°C"),
        tempmax = reading(w.tempmax, "°C"),
        tempmin = reading(w.tempmin, "°C"),
        humidity = reading(w.humidity, "%"),
        dew = reading(w.dew, "°C"),
        windspeed = reading(w.windspeed, " km/h"),
        winddir = reading(w.winddir, "°"),
        windgust = reading(w.windgust, " km/h"),
        precip = reading(w.precip, " mm"),
        cloudcover = reading(w.cloudcover, "%"),
        visibility = reading(w.visibility, " km"),
        pressure = reading(w.pressure, " hPa"),
    )
}

impl DashboardView for TerminalView {
    fn show_records(&self, records: &[CombinedRecord]) {
        let mut text = format!("Fetched {} day(s)\n", records.len());
        for r in records {
            text.push_str(&record_card(r));
        }
        self.emit(&text);
    }

    fn show_table(&self, csv: &str) {
        let mut text = String::from("Stored history (cleaned_data.csv)\n");
        text.push_str(csv);
        if !csv.ends_with('\n') {
            text.push('\n');
        }
        self.emit(&text);
    }

    fn set_status(&self, message: &str) {
        self.emit(&format!("status: {message}\n"));
        if let Some(path) = &self.status_path {
            if let Err(err) = std::fs::write(path, message) {
                tracing::warn!(path = %path.display(), error = %err, "failed to write status file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqi_core::domain::{PollutantSnapshot, WeatherReadings};
    use chrono::NaiveDate;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn record() -> CombinedRecord {
        CombinedRecord {
            date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            pollutant: PollutantSnapshot {
                pm10: Some(95.0),
                aqi: Some(162.0),
                ..Default::default()
            },
            weather: WeatherReadings {
                temp: Some(14.1),
                ..Default::default()
            },
        }
    }

    #[test]
    fn card_marks_missing_readings() {
        let card = record_card(&record());
        assert!(card.starts_with("2025-01-02\n"));
        assert!(card.contains("AQI 162 |"));
        assert!(card.contains("PM2.5 N/A"));
        assert!(card.contains("PM10 95 |"));
        assert!(card.contains("Temp 14.1°C"));
        assert!(card.contains("Pressure N/A"));
    }

    #[test]
    fn status_is_printed_and_mirrored_to_file() {
        let out = Captured::default();
        let path = std::env::temp_dir().join(format!("aqi-status-{}.txt", std::process::id()));
        let view = TerminalView::new(Box::new(out.clone()), Some(path.clone()));

        view.set_status("An error occurred: HTTP error! status: 500");

        assert_eq!(out.text(), "status: An error occurred: HTTP error! status: 500\n");
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "An error occurred: HTTP error! status: 500"
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn table_is_printed_verbatim() {
        let out = Captured::default();
        let view = TerminalView::new(Box::new(out.clone()), None);

        view.show_records(&[record()]);
        view.show_table("date,pm25\n2025-01-02,\n");

        let text = out.text();
        assert!(text.starts_with("Fetched 1 day(s)\n2025-01-02\n"));
        assert!(text.ends_with("Stored history (cleaned_data.csv)\ndate,pm25\n2025-01-02,\n"));
    }
}
