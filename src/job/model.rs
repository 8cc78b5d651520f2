use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Numeric job identifier, assigned by the store at insert time.
pub type JobId = u64;

pub const DEFAULT_FORMAT: &str = "mp4";
pub const DEFAULT_TRANSITION_SECONDS: u32 = 3;

/// Internal lifecycle states of a render job.
///
/// Each job flows through: CREATED → STAGING → RENDERING → COMPLETED,
/// or jumps to FAILED from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Created,
    Staging,
    Rendering,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Collapses the internal sub-states into the externally visible state.
    pub fn public(self) -> PublicState {
        match self {
            JobState::Created | JobState::Staging | JobState::Rendering => PublicState::EnProceso,
            JobState::Completed => PublicState::Completado,
            JobState::Failed => PublicState::Error,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Created => write!(f, "CREATED"),
            JobState::Staging => write!(f, "STAGING"),
            JobState::Rendering => write!(f, "RENDERING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

/// State exposed to clients polling a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicState {
    #[serde(rename = "EN_PROCESO")]
    EnProceso,
    #[serde(rename = "COMPLETADO")]
    Completado,
    #[serde(rename = "ERROR")]
    Error,
}

impl PublicState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PublicState::EnProceso)
    }
}

impl fmt::Display for PublicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublicState::EnProceso => write!(f, "EN_PROCESO"),
            PublicState::Completado => write!(f, "COMPLETADO"),
            PublicState::Error => write!(f, "ERROR"),
        }
    }
}

/// What the render engine produced for a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    pub output_path: String,
    pub output_filename: String,
    pub duration_seconds: f64,
}

/// A job record that has not been persisted yet and therefore has no id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub owner_id: String,
    pub title: String,
    pub has_audio: bool,
    pub audio_filename: Option<String>,
    pub image_count: usize,
    pub transition_seconds: u32,
    pub format: String,
    pub created_at: DateTime<Utc>,
}

impl NewJob {
    pub fn new(
        owner_id: String,
        image_count: usize,
        audio_filename: Option<String>,
        format: Option<String>,
        transition_seconds: Option<u32>,
    ) -> Self {
        let format = format
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_FORMAT.to_string());

        Self {
            owner_id,
            title: generate_title(),
            has_audio: audio_filename.is_some(),
            audio_filename,
            image_count,
            transition_seconds: transition_seconds.unwrap_or(DEFAULT_TRANSITION_SECONDS),
            format,
            created_at: Utc::now(),
        }
    }
}

// "video-" followed by the first 8 hex characters of a random UUID.
fn generate_title() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("video-{}", &id[..8])
}

/// The persisted lifecycle record of one render request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub owner_id: String,
    pub title: String,
    pub state: JobState,
    pub state_history: Vec<JobState>,
    pub has_audio: bool,
    pub audio_filename: Option<String>,
    pub image_count: usize,
    pub transition_seconds: u32,
    pub format: String,
    pub output_path: Option<String>,
    pub output_filename: Option<String>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Materialises a pending record under the id the store assigned to it.
    pub fn from_new(id: JobId, new: NewJob) -> Self {
        Self {
            id,
            owner_id: new.owner_id,
            title: new.title,
            state: JobState::Created,
            state_history: Vec::new(),
            has_audio: new.has_audio,
            audio_filename: new.audio_filename,
            image_count: new.image_count,
            transition_seconds: new.transition_seconds,
            format: new.format,
            output_path: None,
            output_filename: None,
            duration_seconds: None,
            created_at: new.created_at,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Client-facing projection of a job, used by status reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: JobId,
    pub title: String,
    pub state: PublicState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration_seconds: Option<f64>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        let completed = job.state == JobState::Completed;
        Self {
            id: job.id,
            title: job.title.clone(),
            state: job.state.public(),
            output_path: job.output_path.clone().filter(|_| completed),
            output_filename: job.output_filename.clone().filter(|_| completed),
            duration_seconds: job.duration_seconds.filter(|_| completed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> NewJob {
        NewJob::new("alice".into(), 3, None, None, None)
    }

    #[test]
    fn new_job_defaults() {
        let new = new_job();
        assert_eq!(new.format, "mp4");
        assert_eq!(new.transition_seconds, 3);
        assert!(!new.has_audio);
        assert!(new.title.starts_with("video-"));
        assert_eq!(new.title.len(), "video-".len() + 8);
    }

    #[test]
    fn has_audio_follows_audio_filename() {
        let new = NewJob::new("bob".into(), 1, Some("song.mp3".into()), Some(" WEBM ".into()), Some(7));
        assert!(new.has_audio);
        assert_eq!(new.audio_filename.as_deref(), Some("song.mp3"));
        assert_eq!(new.format, "webm");
        assert_eq!(new.transition_seconds, 7);
    }

    #[test]
    fn blank_format_falls_back_to_default() {
        let new = NewJob::new("bob".into(), 1, None, Some("   ".into()), None);
        assert_eq!(new.format, DEFAULT_FORMAT);
    }

    #[test]
    fn job_from_new_starts_created() {
        let job = Job::from_new(42, new_job());
        assert_eq!(job.id, 42);
        assert_eq!(job.state, JobState::Created);
        assert!(job.state_history.is_empty());
        assert!(job.output_path.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn internal_states_collapse_to_public() {
        assert_eq!(JobState::Created.public(), PublicState::EnProceso);
        assert_eq!(JobState::Staging.public(), PublicState::EnProceso);
        assert_eq!(JobState::Rendering.public(), PublicState::EnProceso);
        assert_eq!(JobState::Completed.public(), PublicState::Completado);
        assert_eq!(JobState::Failed.public(), PublicState::Error);
    }

    #[test]
    fn public_state_wire_names() {
        assert_eq!(serde_json::to_string(&PublicState::EnProceso).unwrap(), r#""EN_PROCESO""#);
        assert_eq!(serde_json::to_string(&PublicState::Completado).unwrap(), r#""COMPLETADO""#);
        assert_eq!(serde_json::to_string(&PublicState::Error).unwrap(), r#""ERROR""#);
        assert_eq!(serde_json::to_string(&JobState::Rendering).unwrap(), r#""RENDERING""#);
    }

    #[test]
    fn status_view_hides_outputs_unless_completed() {
        let mut job = Job::from_new(1, new_job());
        job.state = JobState::Failed;
        job.output_path = Some("/leaked/path.mp4".into());

        let view = JobStatusView::from(&job);
        assert_eq!(view.state, PublicState::Error);
        assert!(view.output_path.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("output_path").is_none());
        assert!(json.get("duration_seconds").is_none());
    }
}
