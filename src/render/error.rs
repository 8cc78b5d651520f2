//! Error types for the render engine client.

use thiserror::Error;

/// Errors that can occur while asking the engine to render a job.
///
/// Only [`EngineError`](RenderError::EngineError) is considered transient;
/// every other variant is terminal for the job.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No response within the configured bound.
    #[error("render timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The engine refused the request (HTTP 4xx).
    #[error("engine rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The engine failed internally (HTTP 5xx).
    #[error("engine error (status {status}): {body}")]
    EngineError { status: u16, body: String },

    /// A 2xx response that does not honour the engine's contract.
    #[error("invalid engine response: {0}")]
    InvalidResponse(String),

    /// Connection-level failure (DNS, refused connection, reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RenderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RenderError::EngineError { .. })
    }
}
