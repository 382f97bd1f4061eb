//! One full setup run: readiness, triggers, backup

use crate::backup::{BackupManager, BackupReport, PruneOrder};
use crate::error::{Result, Step};
use crate::provider::InstanceProvider;
use crate::readiness::{ensure_running, Readiness, ReadinessConfig};
use crate::scheduler::{Scheduler, Trigger, TriggerStore};
use crate::types::{DailyWindow, InstanceId};
use crate::window::TriggerTimes;
use chrono::{Local, NaiveDateTime};
use tracing::info;

/// What a successful run did
#[derive(Debug, Clone)]
pub struct RunReport {
    pub readiness: Readiness,
    pub times: TriggerTimes,
    pub triggers: Vec<Trigger>,
    pub backup: BackupReport,
}

/// Sequences the readiness gate, trigger scheduler and backup manager
///
/// The first failing step ends the run; nothing already done is rolled back.
pub struct Orchestrator<'a, P, S> {
    provider: &'a P,
    scheduler: &'a Scheduler<S>,
    readiness: ReadinessConfig,
    prune_order: PruneOrder,
}

impl<'a, P: InstanceProvider, S: TriggerStore> Orchestrator<'a, P, S> {
    pub fn new(provider: &'a P, scheduler: &'a Scheduler<S>) -> Self {
        Self {
            provider,
            scheduler,
            readiness: ReadinessConfig::default(),
            prune_order: PruneOrder::default(),
        }
    }

    pub fn readiness(mut self, config: ReadinessConfig) -> Self {
        self.readiness = config;
        self
    }

    pub fn prune_order(mut self, order: PruneOrder) -> Self {
        self.prune_order = order;
        self
    }

    pub fn run(&self, instance: &InstanceId, window: &DailyWindow) -> Result<RunReport> {
        self.run_at(instance, window, Local::now().naive_local())
    }

    /// Like `run`, labelling the backup with `now`
    pub fn run_at(
        &self,
        instance: &InstanceId,
        window: &DailyWindow,
        now: NaiveDateTime,
    ) -> Result<RunReport> {
        // Reject bad windows before touching the instance.
        let times = TriggerTimes::resolve(window).map_err(|e| e.during(Step::ResolveWindow))?;

        let readiness = ensure_running(self.provider, instance, &self.readiness)
            .map_err(|e| e.during(Step::Readiness))?;

        let triggers = self
            .scheduler
            .schedule_window(instance, &times)
            .map_err(|e| e.during(Step::Schedule))?;
        info!(%instance, %window, "daily triggers set up");

        let backup = BackupManager::with_order(self.provider, self.prune_order)
            .create_image_backup_at(instance, now)
            .map_err(|e| e.during(Step::Backup))?;
        info!(%instance, image = %backup.created.id, "backup created");

        Ok(RunReport {
            readiness,
            times,
            triggers,
            backup,
        })
    }
}

/// The action behind the backup trigger: back up, then optionally shut down
pub fn backup_and_shutdown<P: InstanceProvider>(
    provider: &P,
    instance: &InstanceId,
    order: PruneOrder,
    shutdown: bool,
) -> Result<BackupReport> {
    let report = BackupManager::with_order(provider, order)
        .create_image_backup(instance)
        .map_err(|e| e.during(Step::Backup))?;

    if shutdown {
        info!(%instance, "shutting down");
        provider
            .stop_instance(instance)
            .map_err(|e| e.during(Step::Shutdown))?;
    }

    Ok(report)
}
