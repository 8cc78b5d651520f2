use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::AppState;
use super::error::{ApiError, ApiResult};
use crate::job::{JobId, JobStatusView};
use crate::orchestrator::Submission;
use crate::owner::bearer_token;
use crate::pool::PoolStats;
use crate::stager::{AudioUpload, DEFAULT_AUDIO_FILENAME, ImageUpload};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub workers: PoolStats,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        workers: state.orchestrator.pool().stats(),
    })
}

/// `POST /api/videos`: accepts the uploads and answers before any rendering.
pub async fn create_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobStatusView>)> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let owner_id = state.owners.resolve(bearer_token(authorization)?).await?;

    let mut submission = read_submission(multipart).await?;
    submission.owner_id = owner_id;

    let job = state.orchestrator.submit(submission).await?;
    info!(job_id = job.id, title = %job.title, "video request accepted");
    Ok((StatusCode::ACCEPTED, Json(JobStatusView::from(&job))))
}

/// `GET /api/videos/{id}`
pub async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobStatusView>> {
    let job = state.orchestrator.get_status(id).await?;
    Ok(Json(JobStatusView::from(&job)))
}

async fn read_submission(mut multipart: Multipart) -> ApiResult<Submission> {
    let mut files = Vec::new();
    let mut orders: Option<Vec<usize>> = None;
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                files.push((filename, data.to_vec()));
            }
            "audio" => {
                let filename = field
                    .file_name()
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or(DEFAULT_AUDIO_FILENAME)
                    .to_string();
                let data = field.bytes().await?;
                // Browsers send an empty part for an untouched file input.
                if !data.is_empty() {
                    submission.audio = Some(AudioUpload {
                        filename,
                        data: data.to_vec(),
                    });
                }
            }
            "orders" => orders = Some(parse_orders(&field.text().await?)?),
            "format" => submission.format = non_empty(field.text().await?),
            "transition_seconds" => {
                if let Some(raw) = non_empty(field.text().await?) {
                    let secs = raw.parse::<u32>().map_err(|_| {
                        ApiError::bad_request(format!("invalid transition_seconds: {raw}"))
                    })?;
                    submission.transition_seconds = Some(secs);
                }
            }
            "id" => submission.client_id = Some(field.text().await?),
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }

    let orders = match orders {
        Some(orders) if orders.len() != files.len() => {
            return Err(ApiError::bad_request(format!(
                "{} orders given for {} images",
                orders.len(),
                files.len()
            )));
        }
        Some(orders) => orders,
        None => (0..files.len()).collect(),
    };

    submission.images = files
        .into_iter()
        .zip(orders)
        .map(|((filename, data), order)| ImageUpload {
            order,
            filename,
            data,
        })
        .collect();
    Ok(submission)
}

fn parse_orders(raw: &str) -> ApiResult<Vec<usize>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| ApiError::bad_request(format!("invalid image order: {s}")))
        })
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
