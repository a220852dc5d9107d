pub mod svg;

use crate::domain::ForecastPoint;

/// A drawn chart bound to a canvas. Dropping the handle without calling
/// [`ChartInstance::destroy`] would leave the drawing attached.
pub trait ChartInstance: Send {
    fn destroy(self);
}

/// Draws a forecast series onto the backend's single canvas, in two steps:
/// `draw` renders off-canvas and may fail freely; `bind` attaches a finished
/// drawing to a free canvas and should only fail on canvas I/O.
pub trait ChartBackend: Send {
    type Drawing: Send;
    type Instance: ChartInstance;

    fn draw(&mut self, series: &[ForecastPoint]) -> anyhow::Result<Self::Drawing>;

    fn bind(&mut self, drawing: Self::Drawing) -> anyhow::Result<Self::Instance>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartState {
    Empty,
    Rendered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Rendered,
    /// A newer cycle already drew; this series was discarded.
    Stale,
    /// Nothing to draw; the previous chart (if any) stays.
    NoData,
}

/// Owns the one chart instance of the dashboard.
///
/// The current instance is destroyed before the next one binds to the canvas,
/// so the canvas never carries two overlapping charts. Drawing happens before
/// that, so a series that fails to draw leaves the current chart in place.
/// Renders carry the generation of the refresh cycle that produced them; a
/// render older than the last drawn generation is dropped.
pub struct ChartRenderer<B: ChartBackend> {
    backend: B,
    current: Option<B::Instance>,
    last_generation: u64,
}

impl<B: ChartBackend> ChartRenderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            current: None,
            last_generation: 0,
        }
    }

    pub fn state(&self) -> ChartState {
        if self.current.is_some() {
            ChartState::Rendered
        } else {
            ChartState::Empty
        }
    }

    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }

    pub fn render_for(
        &mut self,
        generation: u64,
        series: &[ForecastPoint],
    ) -> anyhow::Result<RenderOutcome> {
        if generation < self.last_generation {
            tracing::debug!(
                generation,
                last_generation = self.last_generation,
                "discarding stale forecast render"
            );
            return Ok(RenderOutcome::Stale);
        }
        if series.is_empty() {
            return Ok(RenderOutcome::NoData);
        }

        let drawing = self.backend.draw(series)?;
        if let Some(previous) = self.current.take() {
            previous.destroy();
        }
        let instance = self.backend.bind(drawing)?;
        self.current = Some(instance);
        self.last_generation = generation;

        tracing::debug!(generation, points = series.len(), "forecast chart rendered");
        Ok(RenderOutcome::Rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Canvas {
        bound: Arc<AtomicUsize>,
        created: Arc<AtomicUsize>,
        destroyed: Arc<AtomicUsize>,
    }

    struct FakeChart(Canvas);

    impl ChartInstance for FakeChart {
        fn destroy(self) {
            self.0.bound.fetch_sub(1, Ordering::SeqCst);
            self.0.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeBackend {
        canvas: Canvas,
        draws: usize,
        fail_on_draw: Option<usize>,
    }

    impl FakeBackend {
        fn new(canvas: Canvas) -> Self {
            Self {
                canvas,
                draws: 0,
                fail_on_draw: None,
            }
        }
    }

    impl ChartBackend for FakeBackend {
        type Drawing = usize;
        type Instance = FakeChart;

        fn draw(&mut self, series: &[ForecastPoint]) -> anyhow::Result<usize> {
            self.draws += 1;
            anyhow::ensure!(self.fail_on_draw != Some(self.draws), "draw {} failed", self.draws);
            Ok(series.len())
        }

        fn bind(&mut self, _drawing: usize) -> anyhow::Result<FakeChart> {
            let prior = self.canvas.bound.load(Ordering::SeqCst);
            anyhow::ensure!(prior == 0, "canvas already has {prior} chart(s) bound");
            self.canvas.bound.fetch_add(1, Ordering::SeqCst);
            self.canvas.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeChart(self.canvas.clone()))
        }
    }

    fn series(values: &[f64]) -> Vec<ForecastPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| ForecastPoint {
                date: NaiveDate::from_ymd_opt(2025, 1, 4 + i as u32).unwrap(),
                value: *v,
            })
            .collect()
    }

    #[test]
    fn rerender_destroys_before_create() {
        let canvas = Canvas::default();
        let mut renderer = ChartRenderer::new(FakeBackend::new(canvas.clone()));
        assert_eq!(renderer.state(), ChartState::Empty);

        assert_eq!(renderer.render_for(1, &series(&[150.0, 160.0])).unwrap(), RenderOutcome::Rendered);
        assert_eq!(renderer.state(), ChartState::Rendered);

        assert_eq!(renderer.render_for(2, &series(&[140.0])).unwrap(), RenderOutcome::Rendered);
        assert_eq!(renderer.render_for(2, &series(&[130.0])).unwrap(), RenderOutcome::Rendered);

        assert_eq!(canvas.bound.load(Ordering::SeqCst), 1);
        assert_eq!(canvas.created.load(Ordering::SeqCst), 3);
        assert_eq!(canvas.destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_redraw_keeps_current_chart() {
        let canvas = Canvas::default();
        let mut backend = FakeBackend::new(canvas.clone());
        backend.fail_on_draw = Some(2);
        let mut renderer = ChartRenderer::new(backend);

        renderer.render_for(1, &series(&[150.0])).unwrap();
        assert!(renderer.render_for(2, &series(&[160.0])).is_err());

        assert_eq!(renderer.state(), ChartState::Rendered);
        assert_eq!(renderer.last_generation(), 1);
        assert_eq!(canvas.bound.load(Ordering::SeqCst), 1);
        assert_eq!(canvas.destroyed.load(Ordering::SeqCst), 0);

        assert_eq!(renderer.render_for(3, &series(&[170.0])).unwrap(), RenderOutcome::Rendered);
        assert_eq!(canvas.bound.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stale_generation_is_discarded() {
        let canvas = Canvas::default();
        let mut renderer = ChartRenderer::new(FakeBackend::new(canvas.clone()));

        assert_eq!(renderer.render_for(2, &series(&[150.0])).unwrap(), RenderOutcome::Rendered);
        assert_eq!(renderer.render_for(1, &series(&[90.0])).unwrap(), RenderOutcome::Stale);
        assert_eq!(renderer.last_generation(), 2);
        assert_eq!(canvas.created.load(Ordering::SeqCst), 1);

        assert_eq!(renderer.render_for(3, &series(&[120.0])).unwrap(), RenderOutcome::Rendered);
        assert_eq!(canvas.bound.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_series_keeps_previous_chart() {
        let canvas = Canvas::default();
        let mut renderer = ChartRenderer::new(FakeBackend::new(canvas.clone()));

        assert_eq!(renderer.render_for(1, &[]).unwrap(), RenderOutcome::NoData);
        assert_eq!(renderer.state(), ChartState::Empty);

        renderer.render_for(1, &series(&[150.0])).unwrap();
        assert_eq!(renderer.render_for(2, &[]).unwrap(), RenderOutcome::NoData);
        assert_eq!(renderer.state(), ChartState::Rendered);
        assert_eq!(canvas.destroyed.load(Ordering::SeqCst), 0);
    }
}
