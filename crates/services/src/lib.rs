#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod progress_service;

pub use quest_core::Clock;

pub use config::ProgressConfig;
pub use error::ProgressServiceError;
pub use progress_service::{ProgressService, SessionOutcome};
