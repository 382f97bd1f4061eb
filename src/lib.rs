//! linode-lifecycle: run a Linode on a daily schedule
//!
//! This library keeps a single Linode instance running during a daily window,
//! registers cron triggers to boot it, back it up and shut it down, and keeps
//! one image backup of its primary disk per instance.

pub mod backup;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod readiness;
pub mod scheduler;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod window;

pub use backup::{BackupManager, BackupReport, PruneOrder};
pub use error::{Error, Result, Step};
pub use orchestrator::{Orchestrator, RunReport};
pub use provider::InstanceProvider;
pub use readiness::{ensure_running, Readiness, ReadinessConfig};
pub use scheduler::{RegistrationPolicy, Scheduler, SchedulerConfig, Trigger, TriggerStore};
pub use types::{ClockTime, DailyWindow, Image, InstanceId, InstanceStatus};
pub use window::{derive_backup_time, TriggerTimes};
