pub mod client;
pub mod error;
pub mod types;

pub use client::{RenderClient, RenderClientConfig, RenderEngine};
pub use error::RenderError;
pub use types::{RenderRequest, RenderResult};
