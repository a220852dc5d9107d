use crate::chart::{ChartBackend, ChartInstance};
use crate::config::var_or;
use crate::domain::ForecastPoint;
use crate::time::kolkata::format_date;
use anyhow::Context;
use plotters::prelude::*;
use std::path::{Path, PathBuf};

const DEFAULT_CHART_PATH: &str = "forecast_chart.svg";
const DEFAULT_SIZE: (u32, u32) = (900, 420);
const LINE_COLOR: RGBColor = RGBColor(75, 192, 192);

/// Draws the forecast as an SVG line chart into a single canvas file.
#[derive(Debug, Clone)]
pub struct SvgChartBackend {
    path: PathBuf,
    size: (u32, u32),
}

/// Handle to the drawn canvas file.
#[derive(Debug)]
pub struct SvgChart {
    path: PathBuf,
}

/// A finished drawing staged next to the canvas. Removed on drop unless bound.
#[derive(Debug)]
pub struct StagedSvg {
    path: PathBuf,
}

impl Drop for StagedSvg {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl SvgChartBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: DEFAULT_SIZE,
        }
    }

    pub fn from_env() -> Self {
        Self::new(var_or("AQI_CHART_PATH", DEFAULT_CHART_PATH))
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = (width, height);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staged_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".pending");
        self.path.with_file_name(name)
    }
}

impl ChartBackend for SvgChartBackend {
    type Drawing = StagedSvg;
    type Instance = SvgChart;

    fn draw(&mut self, series: &[ForecastPoint]) -> anyhow::Result<StagedSvg> {
        let staged = StagedSvg {
            path: self.staged_path(),
        };
        draw_forecast(&staged.path, self.size, series)
            .with_context(|| format!("failed to draw forecast chart to {}", staged.path.display()))?;
        Ok(staged)
    }

    fn bind(&mut self, drawing: StagedSvg) -> anyhow::Result<SvgChart> {
        std::fs::rename(&drawing.path, &self.path).with_context(|| {
            format!(
                "failed to move {} onto canvas {}",
                drawing.path.display(),
                self.path.display()
            )
        })?;
        Ok(SvgChart {
            path: self.path.clone(),
        })
    }
}

impl ChartInstance for SvgChart {
    fn destroy(self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to clear chart canvas");
            }
        }
    }
}

fn draw_forecast(path: &Path, size: (u32, u32), series: &[ForecastPoint]) -> anyhow::Result<()> {
    anyhow::ensure!(!series.is_empty(), "forecast series is empty");

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let (lo, hi) = series
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.value), hi.max(p.value))
        });
    let pad = if (hi - lo).abs() > 1e-6 {
        (hi - lo) * 0.1
    } else {
        1.0
    };

    let labels: Vec<String> = series.iter().map(|p| format_date(p.date)).collect();
    let n = series.len() as i32;

    // Extra headroom on top for the value labels drawn above each point.
    let mut chart = ChartBuilder::on(&root)
        .caption("Predicted AQI", ("sans-serif", 22))
        .margin(16)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d((0..n).into_segmented(), (lo - pad)..(hi + 2.0 * pad))?;

    chart
        .configure_mesh()
        .x_desc("Date")
        .y_desc("AQI")
        .x_labels(series.len())
        .x_label_formatter(&|v: &SegmentValue<i32>| match v {
            SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
                labels.get(*i as usize).cloned().unwrap_or_default()
            }
            SegmentValue::Last => String::new(),
        })
        .light_line_style(BLACK.mix(0.08))
        .draw()?;

    let points: Vec<(SegmentValue<i32>, f64)> = series
        .iter()
        .enumerate()
        .map(|(i, p)| (SegmentValue::CenterOf(i as i32), p.value))
        .collect();

    chart.draw_series(LineSeries::new(points.clone(), LINE_COLOR.stroke_width(2)))?;
    chart.draw_series(PointSeries::of_element(
        points,
        4,
        LINE_COLOR.filled(),
        &|coord: (SegmentValue<i32>, f64), size, style| {
            let label = format!("{:.0}", coord.1);
            EmptyElement::at(coord)
                + Circle::new((0, 0), size, style)
                + Text::new(label, (-10, -22), ("sans-serif", 14).into_font())
        },
    ))?;

    root.present()?;
    Ok(())
}
