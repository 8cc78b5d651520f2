pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod orchestrator;
pub mod owner;
pub mod pool;
pub mod render;
pub mod stager;
pub mod store;
pub mod ui;
