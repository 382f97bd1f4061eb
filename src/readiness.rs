//! Make sure the instance is running before anything else happens

use crate::error::{Error, Result};
use crate::provider::InstanceProvider;
use crate::types::InstanceId;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// How long to wait for a booting instance
#[derive(Debug, Clone, Copy)]
pub struct ReadinessConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(180),
        }
    }
}

/// What the readiness gate had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    AlreadyRunning,
    Started { waited: Duration },
}

/// Boot `instance` if needed and poll until the provider reports it running.
///
/// "Running" is the provider's view; services inside the instance may still
/// be starting when this returns.
pub fn ensure_running<P: InstanceProvider>(
    provider: &P,
    instance: &InstanceId,
    config: &ReadinessConfig,
) -> Result<Readiness> {
    let status = provider.instance_status(instance)?;
    if status.is_running() {
        info!(%instance, "instance is running");
        return Ok(Readiness::AlreadyRunning);
    }

    info!(%instance, %status, "instance is not running, booting it");
    provider.start_instance(instance)?;

    let started = Instant::now();
    loop {
        thread::sleep(config.poll_interval);

        let status = provider.instance_status(instance)?;
        let waited = started.elapsed();
        if status.is_running() {
            info!(%instance, ?waited, "instance is running");
            return Ok(Readiness::Started { waited });
        }

        debug!(%instance, %status, ?waited, "still waiting for instance");
        if waited >= config.timeout {
            return Err(Error::ReadinessTimeout {
                instance: instance.clone(),
                waited,
            });
        }
    }
}
