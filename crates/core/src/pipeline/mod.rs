pub mod orchestrator;

pub use orchestrator::{CycleOutcome, CycleReport, ForecastOutcome, Orchestrator, PipelineParts};

use crate::domain::{CombinedRecord, ForecastPoint};
use chrono::NaiveDate;

/// Resolves the last durably stored date. Best effort: failures read as `None`.
#[async_trait::async_trait]
pub trait CheckpointSource: Send + Sync {
    async fn checkpoint(&self) -> Option<NaiveDate>;
}

#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_range(&self, checkpoint: Option<NaiveDate>) -> anyhow::Result<Vec<CombinedRecord>>;
}

/// Backend confirmation for an accepted upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub body: serde_json::Value,
}

#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, records: &[CombinedRecord]) -> anyhow::Result<UploadReceipt>;
}

/// Best effort: failures read as `None`.
#[async_trait::async_trait]
pub trait ForecastSource: Send + Sync {
    async fn forecast(&self) -> Option<Vec<ForecastPoint>>;
}

/// Raw CSV view of the stored history, displayed verbatim.
#[async_trait::async_trait]
pub trait TableSource: Send + Sync {
    async fn cleaned_csv(&self) -> anyhow::Result<String>;
}

/// The dashboard surface the pipeline writes to.
pub trait DashboardView: Send + Sync {
    fn show_records(&self, records: &[CombinedRecord]);
    fn show_table(&self, csv: &str);
    fn set_status(&self, message: &str);
}
