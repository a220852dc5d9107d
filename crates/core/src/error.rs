use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request could not be sent or its body could not be read.
    Transport,
    /// Upstream answered with a non-2xx status.
    Http { status: u16 },
    /// Body was readable but not the JSON shape we expect.
    Shape,
}

/// Diagnostics carried inside `anyhow::Error` so callers can downcast and
/// branch on the failure kind (e.g. surface the HTTP status to the user).
#[derive(Debug, Clone)]
pub struct PipelineError {
    pub stage: &'static str,
    pub kind: FailureKind,
    pub detail: String,
}

impl PipelineError {
    pub fn transport(stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Transport,
            detail: detail.into(),
        }
    }

    pub fn http(stage: &'static str, status: u16, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Http { status },
            detail: detail.into(),
        }
    }

    pub fn shape(stage: &'static str, detail: impl Into<String>) -> Self {
        Self {
            stage,
            kind: FailureKind::Shape,
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FailureKind::Http { status } => Some(status),
            _ => None,
        }
    }

    /// Finds the diagnostics anywhere in an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&PipelineError> {
        err.chain().find_map(|e| e.downcast_ref::<PipelineError>())
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Http { status } => write!(
                f,
                "{} failed: HTTP error! status: {status} ({})",
                self.stage, self.detail
            ),
            FailureKind::Transport => write!(f, "{} failed: transport: {}", self.stage, self.detail),
            FailureKind::Shape => write!(f, "{} failed: unexpected shape: {}", self.stage, self.detail),
        }
    }
}

impl std::error::Error for PipelineError {}
