//! The probe request pipeline
//!
//! `Received → Validated → Downloaded → Probed → Extracted → Responded`, with
//! every stage able to end in a [`ServiceError`]. The downloaded file lives in
//! a [`DownloadedAsset`](crate::downloader::DownloadedAsset) owned by
//! [`run`], so it is gone by the time `run` returns or its future is dropped.

use std::fmt;

use tokio::time::timeout;

use crate::context::RequestContext;
use crate::error::{ServiceError, ServiceResult};
use crate::metadata_extractor::MetadataExtractor;
use crate::models::{MediaInfoResponse, ProbeRequest};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    Downloaded,
    Probed,
    Extracted,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Downloaded => "downloaded",
            Stage::Probed => "probed",
            Stage::Extracted => "extracted",
            Stage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Run the pipeline under the configured overall time budget
pub async fn run_with_budget(
    state: &AppState,
    ctx: &RequestContext,
    body: &[u8],
) -> ServiceResult<MediaInfoResponse> {
    let budget = state.config.max_processing_time();
    let result = match timeout(budget, run(state, ctx, body)).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::TimedOut(budget)),
    };

    match &result {
        Ok(_) => ctx.log(&format!("Request {}", Stage::Responded)).await,
        Err(e) => {
            ctx.log(&format!("Request failed ({})", e.kind())).await;
            ctx.log_failure(e).await;
        }
    }

    result
}

/// Validate, download, probe and extract
pub async fn run(
    state: &AppState,
    ctx: &RequestContext,
    body: &[u8],
) -> ServiceResult<MediaInfoResponse> {
    ctx.log(&format!("Request {}", Stage::Received)).await;

    let request = ProbeRequest::parse(body)?;
    ctx.log(&format!(
        "Request {}: starting media info request for URL: {}",
        Stage::Validated,
        request.media_url
    ))
    .await;

    let asset = state.downloader.fetch(ctx, &request.media_url).await?;
    ctx.log(&format!(
        "Request {}: {} stored at {}",
        Stage::Downloaded,
        asset.originating_url(),
        asset.local_path().display()
    ))
    .await;

    let raw = state.prober.probe(ctx, asset.local_path()).await?;
    ctx.log(&format!("Request {}", Stage::Probed)).await;

    let report = MetadataExtractor::parse_report(&raw).map_err(|source| {
        ServiceError::MalformedOutput {
            source,
            raw_output: raw.chars().take(500).collect(),
        }
    })?;

    let info = if state.config.include_raw_output {
        MetadataExtractor::extract_with_raw(asset.file_name(), &report, &raw)
    } else {
        MetadataExtractor::extract(asset.file_name(), &report)
    };
    ctx.log(&format!(
        "Request {}: media information extracted successfully",
        Stage::Extracted
    ))
    .await;

    Ok(info)
}
