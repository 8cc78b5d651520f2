use std::path::PathBuf;

use thiserror::Error;

use crate::job::{JobId, JobState};

/// Bad submissions, rejected before any job record exists.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("at least one image is required")]
    NoImages,

    #[error("{count} images supplied, at most {max} are allowed")]
    TooManyImages { count: usize, max: usize },

    #[error("image order {order} is outside 0..={max}")]
    OrderOutOfRange { order: usize, max: usize },

    #[error("image order {0} is used more than once")]
    DuplicateOrder(usize),

    #[error("a new video cannot already have an ID ({0})")]
    ClientSuppliedId(String),

    #[error("render workers are saturated, try again later")]
    Saturated,

    #[error("could not persist job: {0}")]
    Store(#[from] StoreError),
}

/// Filesystem failures while writing a job's assets.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("no images to stage")]
    NoImages,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StagingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures of the job record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id} is {actual}, expected {expected}")]
    Conflict {
        id: JobId,
        expected: JobState,
        actual: JobState,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures resolving the submitting user from a bearer token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OwnerError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("unknown or expired token")]
    UnknownToken,
}
