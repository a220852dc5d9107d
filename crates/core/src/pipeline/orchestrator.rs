use crate::chart::{ChartBackend, ChartRenderer, ChartState, RenderOutcome};
use crate::error::PipelineError;
use crate::pipeline::{
    CheckpointSource, DashboardView, ForecastSource, SourceFetcher, TableSource, Uploader,
};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Instrument;

/// Collaborators of a refresh cycle.
#[derive(Clone)]
pub struct PipelineParts {
    pub checkpoints: Arc<dyn CheckpointSource>,
    pub sources: Arc<dyn SourceFetcher>,
    pub uploader: Arc<dyn Uploader>,
    pub forecasts: Arc<dyn ForecastSource>,
    pub tables: Arc<dyn TableSource>,
    pub view: Arc<dyn DashboardView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastOutcome {
    Rendered,
    Stale,
    NoForecast,
    RenderFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    FetchFailed,
    /// Nothing new upstream; upload and forecast were skipped.
    Empty,
    UploadFailed { status: Option<u16> },
    Completed { chart: ForecastOutcome },
}

#[derive(Debug)]
pub struct CycleReport {
    pub generation: u64,
    pub checkpoint: Option<NaiveDate>,
    pub records: usize,
    pub outcome: CycleOutcome,
    pub error: Option<anyhow::Error>,
}

/// Runs the refresh cycle: checkpoint, fetch + merge, upload, table
/// redisplay, forecast, chart.
///
/// Cycles may overlap (a manual trigger while another is in flight). Each
/// cycle takes the next generation number and its chart render is dropped if
/// a newer cycle has already drawn.
pub struct Orchestrator<B: ChartBackend> {
    parts: PipelineParts,
    chart: tokio::sync::Mutex<ChartRenderer<B>>,
    generation: AtomicU64,
}

impl<B: ChartBackend> Orchestrator<B> {
    pub fn new(parts: PipelineParts, chart: ChartRenderer<B>) -> Self {
        Self {
            parts,
            chart: tokio::sync::Mutex::new(chart),
            generation: AtomicU64::new(0),
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let generation = self.next_generation();
        let span = tracing::info_span!(
            "refresh_cycle",
            cycle_id = %uuid::Uuid::new_v4(),
            generation
        );
        self.cycle(generation).instrument(span).await
    }

    /// Forecast fetch and chart render only.
    pub async fn render_forecast(&self) -> ForecastOutcome {
        let generation = self.next_generation();
        let span = tracing::info_span!("forecast_refresh", generation);
        self.forecast_and_render(generation).instrument(span).await
    }

    /// Fetches the raw CSV view and hands it to the view. Failures are logged only.
    pub async fn refresh_table(&self) {
        match self.parts.tables.cleaned_csv().await {
            Ok(csv) => self.parts.view.show_table(&csv),
            Err(err) => tracing::warn!(error = %format!("{err:#}"), "failed to fetch csv view"),
        }
    }

    pub async fn chart_state(&self) -> ChartState {
        self.chart.lock().await.state()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn cycle(&self, generation: u64) -> CycleReport {
        let checkpoint = self.parts.checkpoints.checkpoint().await;
        tracing::info!(checkpoint = ?checkpoint, "resolved checkpoint");

        let report = |records: usize, outcome: CycleOutcome, error: Option<anyhow::Error>| CycleReport {
            generation,
            checkpoint,
            records,
            outcome,
            error,
        };

        let records = match self.parts.sources.fetch_range(checkpoint).await {
            Ok(records) => records,
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "source fetch failed; halting cycle");
                return report(0, CycleOutcome::FetchFailed, Some(err));
            }
        };

        if records.is_empty() {
            tracing::info!("no data fetched; skipping upload and forecast");
            return report(0, CycleOutcome::Empty, None);
        }
        let count = records.len();
        self.parts.view.show_records(&records);

        match self.parts.uploader.upload(&records).await {
            Ok(receipt) => {
                tracing::info!(records = count, response = %receipt.body, "upload accepted");
            }
            Err(err) => {
                let status = PipelineError::find(&err).and_then(PipelineError::status);
                let message = match status {
                    Some(code) => format!("An error occurred: HTTP error! status: {code}"),
                    None => format!("An error occurred: {err:#}"),
                };
                tracing::error!(records = count, status = ?status, error = %format!("{err:#}"), "upload failed; halting cycle");
                self.parts.view.set_status(&message);
                return report(count, CycleOutcome::UploadFailed { status }, Some(err));
            }
        }

        self.refresh_table().await;

        let chart = self.forecast_and_render(generation).await;
        report(count, CycleOutcome::Completed { chart }, None)
    }

    async fn forecast_and_render(&self, generation: u64) -> ForecastOutcome {
        let Some(series) = self.parts.forecasts.forecast().await else {
            return ForecastOutcome::NoForecast;
        };

        let mut chart = self.chart.lock().await;
        match chart.render_for(generation, &series) {
            Ok(RenderOutcome::Rendered) => ForecastOutcome::Rendered,
            Ok(RenderOutcome::Stale) => {
                tracing::info!(generation, "newer cycle already rendered; dropping forecast");
                ForecastOutcome::Stale
            }
            Ok(RenderOutcome::NoData) => {
                tracing::info!("forecast is empty; keeping previous chart");
                ForecastOutcome::NoForecast
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to render forecast chart");
                ForecastOutcome::RenderFailed
            }
        }
    }
}
