//! Error types for linode-lifecycle

use crate::types::InstanceId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for linode-lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing an instance
#[derive(Error, Debug)]
pub enum Error {
    #[error("Provider call failed: {command}\nstderr: {stderr}")]
    ProviderCallFailed { command: String, stderr: String },

    #[error("No disk found for Linode ID {0}. Backup cannot proceed.")]
    NoDiskFound(InstanceId),

    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    #[error("Invalid time input: {0}")]
    InvalidTimeInput(String),

    #[error("Invalid instance ID '{0}': use letters, digits, '-' or '_'")]
    InvalidInstanceId(String),

    #[error("Command cannot be scheduled with cron: {0}")]
    InvalidCommand(String),

    #[error("Linode ID {instance} was not running after {waited:?}")]
    ReadinessTimeout { instance: InstanceId, waited: Duration },

    #[error("{step} failed: {source}")]
    StepFailed {
        step: Step,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Attach the orchestration step this error occurred in
    pub fn during(self, step: Step) -> Self {
        Error::StepFailed {
            step,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping step wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// A stage of an orchestration run, used to report where a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Readiness,
    ResolveWindow,
    Schedule,
    Backup,
    Shutdown,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Readiness => "Readiness check",
            Step::ResolveWindow => "Time window resolution",
            Step::Schedule => "Trigger scheduling",
            Step::Backup => "Image backup",
            Step::Shutdown => "Shutdown",
        };
        write!(f, "{}", name)
    }
}
