use crate::error::PipelineError;
use serde::de::DeserializeOwned;

const MAX_DETAIL_CHARS: usize = 512;

/// Sends `req` and returns the body of a 2xx response.
pub(crate) async fn send_text(
    stage: &'static str,
    req: reqwest::RequestBuilder,
) -> anyhow::Result<String> {
    let res = req
        .send()
        .await
        .map_err(|e| PipelineError::transport(stage, e.to_string()))?;

    let status = res.status();
    let text = res
        .text()
        .await
        .map_err(|e| PipelineError::transport(stage, format!("failed to read body: {e}")))?;

    if !status.is_success() {
        return Err(PipelineError::http(stage, status.as_u16(), clip(&text)).into());
    }
    Ok(text)
}

/// Like [`send_text`], then decodes the body as `T`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    stage: &'static str,
    req: reqwest::RequestBuilder,
) -> anyhow::Result<T> {
    let text = send_text(stage, req).await?;
    serde_json::from_str::<T>(&text)
        .map_err(|e| PipelineError::shape(stage, format!("{e}: {}", clip(&text))).into())
}

fn clip(text: &str) -> String {
    text.chars().take(MAX_DETAIL_CHARS).collect()
}
