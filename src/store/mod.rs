//! Persistence seam for job records.
//!
//! The orchestrator only talks to [`JobStore`]. Updates carry the state the
//! caller last observed so a job that already reached a terminal state can
//! never be overwritten by a stale in-flight write.

mod file;
mod memory;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::job::{Job, JobId, JobState, NewJob};

pub use file::JsonFileJobStore;
pub use memory::InMemoryJobStore;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new record, assigning its id.
    async fn insert(&self, new: NewJob) -> Result<Job, StoreError>;

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Replaces the stored record with `job` if the stored state still equals
    /// `expected`, otherwise fails with [`StoreError::Conflict`].
    async fn update(&self, job: &Job, expected: JobState) -> Result<(), StoreError>;
}

fn check_expected(stored: &Job, expected: JobState) -> Result<(), StoreError> {
    if stored.state != expected {
        return Err(StoreError::Conflict {
            id: stored.id,
            expected,
            actual: stored.state,
        });
    }
    Ok(())
}
