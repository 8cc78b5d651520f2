use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::{JobStore, check_expected};
use crate::error::StoreError;
use crate::job::{Job, JobId, JobState, NewJob};

/// Stores each job as `{dir}/{id}.json`.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never observes a half-written record.
#[derive(Debug)]
pub struct JsonFileJobStore {
    dir: PathBuf,
    next_id: AtomicU64,
    // Serialises read-compare-write cycles.
    write_lock: Mutex<()>,
}

impl JsonFileJobStore {
    /// Opens (creating if needed) the records directory and resumes id
    /// assignment after the highest existing record.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;

        let mut max_id = 0;
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<JobId>().ok())
            {
                max_id = max_id.max(id);
            }
        }
        debug!(dir = %dir.display(), max_id, "opened job record store");

        Ok(Self {
            dir,
            next_id: AtomicU64::new(max_id + 1),
            write_lock: Mutex::new(()),
        })
    }

    fn record_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn read_record(path: &Path) -> Result<Option<Job>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, job: &Job) -> Result<(), StoreError> {
        let path = self.record_path(job.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(job)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for JsonFileJobStore {
    async fn insert(&self, new: NewJob) -> Result<Job, StoreError> {
        let _guard = self.write_lock.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let job = Job::from_new(id, new);
        self.write_record(&job).await?;
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Self::read_record(&self.record_path(id)).await
    }

    async fn update(&self, job: &Job, expected: JobState) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let stored = Self::read_record(&self.record_path(job.id))
            .await?
            .ok_or(StoreError::NotFound(job.id))?;
        check_expected(&stored, expected)?;
        self.write_record(job).await
    }
}
