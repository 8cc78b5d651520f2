use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use super::error::RenderError;
use super::types::{
    EngineResponse, RenderRequest, RenderResult, WithAudioBody, WithoutAudioBody,
};

const DEFAULT_BASE_URL: &str = "http://video-python:9094";
const WITH_AUDIO_PATH: &str = "/generate_video/";
const WITHOUT_AUDIO_PATH: &str = "/generate_video_whitout/";

/// Anything that can turn staged assets into a video.
///
/// The orchestrator depends on this trait rather than on [`RenderClient`]
/// so tests can script engine behaviour without a network.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn invoke(&self, req: &RenderRequest) -> Result<RenderResult, RenderError>;
}

#[derive(Debug, Clone)]
pub struct RenderClientConfig {
    pub base_url: String,
    pub with_audio_path: String,
    pub without_audio_path: String,
    /// Hard bound on one render call, body included.
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for RenderClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            with_audio_path: WITH_AUDIO_PATH.to_string(),
            without_audio_path: WITHOUT_AUDIO_PATH.to_string(),
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP client for the render engine.
#[derive(Debug, Clone)]
pub struct RenderClient {
    http: Client,
    config: RenderClientConfig,
}

impl RenderClient {
    pub fn new(config: RenderClientConfig) -> Result<Self, RenderError> {
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, RenderError> {
        Self::new(RenderClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    fn endpoint(&self, with_audio: bool) -> String {
        let path = if with_audio {
            &self.config.with_audio_path
        } else {
            &self.config.without_audio_path
        };
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn map_transport(&self, err: reqwest::Error) -> RenderError {
        if err.is_timeout() {
            RenderError::Timeout {
                secs: self.config.timeout.as_secs(),
            }
        } else {
            RenderError::Transport(err)
        }
    }

    async fn send(&self, req: &RenderRequest) -> Result<reqwest::Response, reqwest::Error> {
        let url = self.endpoint(req.has_audio());
        let builder = self.http.post(&url);
        let builder = match &req.audio_path {
            Some(audio_path) => builder.json(&WithAudioBody {
                images_path: req.images_path.clone(),
                audio_path: audio_path.clone(),
                video_path: req.output_path.clone(),
                format: req.format.clone(),
            }),
            None => builder.json(&WithoutAudioBody {
                images_path: req.images_path.clone(),
                video_path: req.output_path.clone(),
                format: req.format.clone(),
                transicion_segundos: req.transition_seconds,
            }),
        };
        debug!(%url, with_audio = req.has_audio(), "calling render engine");
        builder.send().await
    }
}

#[async_trait]
impl RenderEngine for RenderClient {
    async fn invoke(&self, req: &RenderRequest) -> Result<RenderResult, RenderError> {
        let response = self.send(req).await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_transport(e))?;

        if status.is_client_error() {
            error!(status = status.as_u16(), %body, "render engine rejected request");
            return Err(RenderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        if status.is_server_error() {
            error!(status = status.as_u16(), %body, "render engine failed");
            return Err(RenderError::EngineError {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            error!(status = status.as_u16(), %body, "unexpected render engine status");
            return Err(RenderError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }

        let result = parse_success(&body)?;
        info!(
            full_path = %result.full_path,
            duration = result.duration_seconds,
            "render engine produced video"
        );
        Ok(result)
    }
}

/// Validates a 2xx body: `metadata.full_path` and a positive
/// `metadata.duration` are mandatory.
fn parse_success(body: &str) -> Result<RenderResult, RenderError> {
    let response: EngineResponse = serde_json::from_str(body)
        .map_err(|e| RenderError::InvalidResponse(format!("malformed JSON: {e}")))?;
    let metadata = response
        .metadata
        .ok_or_else(|| RenderError::InvalidResponse("missing metadata".into()))?;

    let full_path = metadata
        .full_path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| RenderError::InvalidResponse("missing metadata.full_path".into()))?;
    let duration = metadata
        .duration
        .ok_or_else(|| RenderError::InvalidResponse("missing metadata.duration".into()))?;
    if !duration.is_finite() || duration <= 0.0 {
        return Err(RenderError::InvalidResponse(format!(
            "non-positive metadata.duration: {duration}"
        )));
    }

    let filename = Path::new(&full_path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .or(metadata.filename)
        .unwrap_or_else(|| full_path.clone());

    Ok(RenderResult {
        filename,
        full_path,
        duration_seconds: duration,
        images_used: metadata.images_used,
        resolution: metadata.resolution,
        fps: metadata.fps,
    })
}
