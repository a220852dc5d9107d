use aqi_core::backend::BackendClient;
use aqi_core::chart::svg::SvgChartBackend;
use aqi_core::chart::ChartRenderer;
use aqi_core::pipeline::{CycleReport, Orchestrator, PipelineParts, TableSource};
use aqi_core::sources::HttpSourceFetcher;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::task::JoinSet;
use tokio::time::Interval;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod view;

type Dashboard = Orchestrator<SvgChartBackend>;

#[derive(Debug, Parser)]
#[command(name = "aqi_worker")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one refresh cycle (default).
    Refresh,
    /// Run the on-load cycle, then another per line on stdin or per tick, until Ctrl-C.
    Watch {
        /// Also trigger a cycle every N seconds.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Fetch the forecast and redraw the chart only.
    Forecast,
    /// Print the stored history as CSV.
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = aqi_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let backend = Arc::new(BackendClient::from_settings(&settings)?);
    let chart = SvgChartBackend::from_env();
    let chart_path = chart.path().to_path_buf();
    let status_path = std::env::var("AQI_STATUS_PATH")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    let parts = PipelineParts {
        checkpoints: backend.clone(),
        sources: Arc::new(HttpSourceFetcher::from_settings(&settings, backend.clone())?),
        uploader: backend.clone(),
        forecasts: backend.clone(),
        tables: backend.clone(),
        view: Arc::new(view::TerminalView::stdout(status_path)),
    };
    let dashboard = Arc::new(Orchestrator::new(parts, ChartRenderer::new(chart)));

    match args.command.unwrap_or(Command::Refresh) {
        Command::Refresh => {
            let report = dashboard.run_cycle().await;
            finish(report)?;
        }
        Command::Watch { interval_secs } => watch(dashboard, interval_secs).await?,
        Command::Forecast => {
            let outcome = dashboard.render_forecast().await;
            tracing::info!(?outcome, chart = %chart_path.display(), "forecast refresh finished");
        }
        Command::Csv => {
            let csv = backend.cleaned_csv().await.context("failed to fetch csv view")?;
            print!("{csv}");
        }
    }

    Ok(())
}

fn finish(report: CycleReport) -> anyhow::Result<()> {
    tracing::info!(
        generation = report.generation,
        checkpoint = ?report.checkpoint,
        records = report.records,
        outcome = ?report.outcome,
        "refresh cycle finished"
    );
    match report.error {
        Some(err) => {
            sentry_anyhow::capture_anyhow(&err);
            Err(err)
        }
        None => Ok(()),
    }
}

async fn watch(dashboard: Arc<Dashboard>, interval_secs: Option<u64>) -> anyhow::Result<()> {
    let period = interval_period(interval_secs)?;

    let mut cycles = JoinSet::new();
    let spawn = |cycles: &mut JoinSet<()>, trigger: &'static str| {
        let dashboard = dashboard.clone();
        cycles.spawn(async move {
            tracing::info!(trigger, "refresh triggered");
            // Failed cycles are reported; the loop keeps serving triggers.
            let _ = finish(dashboard.run_cycle().await);
        });
    };

    let forecast = dashboard.render_forecast().await;
    tracing::info!(outcome = ?forecast, "initial forecast render");
    spawn(&mut cycles, "load");

    let ticker = period.map(|p| tokio::time::interval_at(tokio::time::Instant::now() + p, p));
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("press Enter to refresh, Ctrl-C to stop");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    match trigger_loop(&mut lines, ticker, shutdown, &mut cycles, spawn).await {
        LoopExit::InputClosed => {
            tracing::info!(in_flight = cycles.len(), "stdin closed; finishing in-flight cycles");
            while let Some(joined) = cycles.join_next().await {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "refresh task panicked");
                }
            }
        }
        LoopExit::Interrupted => {
            if !cycles.is_empty() {
                tracing::info!(in_flight = cycles.len(), "stopping with cycles in flight");
            }
            cycles.shutdown().await;
        }
    }
    Ok(())
}

fn interval_period(interval_secs: Option<u64>) -> anyhow::Result<Option<Duration>> {
    match interval_secs {
        Some(0) => anyhow::bail!("--interval-secs must be >= 1"),
        Some(secs) => Ok(Some(Duration::from_secs(secs))),
        None => Ok(None),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LoopExit {
    Interrupted,
    /// Stdin reached EOF and no interval is configured, so no trigger is left.
    InputClosed,
}

/// Serves triggers (one per stdin line, one per tick) until shutdown, reaping
/// finished cycles as it goes.
async fn trigger_loop<R, F>(
    lines: &mut Lines<R>,
    mut ticker: Option<Interval>,
    shutdown: impl Future<Output = ()>,
    cycles: &mut JoinSet<()>,
    spawn: F,
) -> LoopExit
where
    R: AsyncBufRead + Unpin,
    F: Fn(&mut JoinSet<()>, &'static str),
{
    tokio::pin!(shutdown);
    let mut stdin_open = true;

    loop {
        if !stdin_open && ticker.is_none() {
            return LoopExit::InputClosed;
        }
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(_)) => spawn(cycles, "manual"),
                Ok(None) => stdin_open = false,
                Err(err) => {
                    tracing::warn!(error = %err, "stdin closed");
                    stdin_open = false;
                }
            },
            _ = tick(&mut ticker) => spawn(cycles, "interval"),
            Some(joined) = cycles.join_next() => {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "refresh task panicked");
                }
            }
            _ = &mut shutdown => return LoopExit::Interrupted,
        }
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn init_sentry(settings: &aqi_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
