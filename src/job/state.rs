use chrono::Utc;
use thiserror::Error;

use super::model::{Job, JobState, RenderOutput};

/// Something that happened to a job while its continuation ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The worker picked the job up and is about to stage assets.
    BeginStaging,
    /// Assets are on disk; the render engine is about to be called.
    BeginRendering,
    /// The engine produced a video.
    Rendered(RenderOutput),
    /// Staging or rendering failed.
    Fail,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::BeginStaging => "begin_staging",
            Event::BeginRendering => "begin_rendering",
            Event::Rendered(_) => "rendered",
            Event::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job {job_id} is already {state}")]
    AlreadyTerminal { job_id: u64, state: JobState },

    #[error("job {job_id} cannot apply `{event}` while {state}")]
    Invalid {
        job_id: u64,
        state: JobState,
        event: &'static str,
    },
}

/// Drives a `Job` through the render lifecycle.
pub struct StateMachine;

impl StateMachine {
    /// Applies `event` to the job in place and returns the state it left.
    ///
    /// The returned state is what the store must still hold for the write to
    /// be accepted, so callers pass it straight to `JobStore::update`.
    ///
    /// - `BeginStaging` is only valid from `Created`.
    /// - `BeginRendering` is only valid from `Staging`.
    /// - `Rendered` is only valid from `Rendering` and fills the output fields.
    /// - `Fail` is valid from any non-terminal state.
    /// - Terminal jobs reject every event.
    pub fn apply(job: &mut Job, event: Event) -> Result<JobState, TransitionError> {
        let from = job.state;
        if from.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                job_id: job.id,
                state: from,
            });
        }

        let next = match (&event, from) {
            (Event::BeginStaging, JobState::Created) => JobState::Staging,
            (Event::BeginRendering, JobState::Staging) => JobState::Rendering,
            (Event::Rendered(_), JobState::Rendering) => JobState::Completed,
            (Event::Fail, _) => JobState::Failed,
            _ => {
                return Err(TransitionError::Invalid {
                    job_id: job.id,
                    state: from,
                    event: event.name(),
                });
            }
        };

        match event {
            Event::Rendered(output) => {
                job.output_path = Some(output.output_path);
                job.output_filename = Some(output.output_filename);
                job.duration_seconds = Some(output.duration_seconds);
                job.completed_at = Some(Utc::now());
            }
            Event::Fail => {
                // output_path is set if and only if the job completed.
                job.output_path = None;
                job.output_filename = None;
                job.duration_seconds = None;
                job.completed_at = Some(Utc::now());
            }
            Event::BeginStaging | Event::BeginRendering => {}
        }

        job.state_history.push(from);
        job.state = next;
        Ok(from)
    }
}
