mod model;
mod state;

pub use model::{
    DEFAULT_FORMAT, DEFAULT_TRANSITION_SECONDS, Job, JobId, JobState, JobStatusView, NewJob,
    PublicState, RenderOutput,
};
pub use state::{Event, StateMachine, TransitionError};
