//! End-to-end runs against the in-memory provider and trigger store

use chrono::{NaiveDate, NaiveDateTime};
use linode_lifecycle::scheduler::TriggerAction;
use linode_lifecycle::test_utils::{Call, FakeProvider, MemoryTriggerStore};
use linode_lifecycle::{
    DailyWindow, Error, InstanceId, InstanceStatus, Orchestrator, Readiness, ReadinessConfig,
    RegistrationPolicy, Scheduler, SchedulerConfig, Step,
};
use std::time::Duration;

fn scheduler(policy: RegistrationPolicy) -> Scheduler<MemoryTriggerStore> {
    Scheduler::with_config(
        MemoryTriggerStore::default(),
        SchedulerConfig {
            linode_cli_path: "/usr/bin/linode-cli".to_string(),
            backup_command: "/usr/local/bin/linode-lifecycle backup --shutdown".to_string(),
            policy,
        },
    )
}

fn no_wait() -> ReadinessConfig {
    ReadinessConfig {
        poll_interval: Duration::ZERO,
        timeout: Duration::from_secs(30),
    }
}

fn backup_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 2)
        .unwrap()
        .and_hms_opt(17, 55, 0)
        .unwrap()
}

#[test]
fn stopped_instance_is_booted_scheduled_and_backed_up() {
    let instance = InstanceId::new("123").unwrap();
    let window = DailyWindow::parse("09:00", "18:00").unwrap();
    let provider = FakeProvider::new()
        .with_status("123", &[InstanceStatus::Offline, InstanceStatus::Running])
        .with_image("private/1", "Backup of Linode ID 123")
        .with_image("private/2", "Backup of Linode ID 456")
        .with_disks("123", &["d1", "d2"]);
    let scheduler = scheduler(RegistrationPolicy::Upsert);

    let report = Orchestrator::new(&provider, &scheduler)
        .readiness(no_wait())
        .run_at(&instance, &window, backup_time())
        .unwrap();

    assert!(matches!(report.readiness, Readiness::Started { .. }));
    assert!(provider
        .calls()
        .contains(&Call::StartInstance("123".to_string())));

    let triggers: Vec<(String, TriggerAction, String)> = report
        .triggers
        .iter()
        .map(|t| (t.time.to_string(), t.key.action, t.command.clone()))
        .collect();
    assert_eq!(
        triggers,
        vec![
            (
                "09:00".to_string(),
                TriggerAction::Boot,
                "/usr/bin/linode-cli linodes boot 123".to_string()
            ),
            (
                "17:55".to_string(),
                TriggerAction::BackupAndShutdown,
                "/usr/local/bin/linode-lifecycle backup --shutdown 123".to_string()
            ),
            (
                "18:00".to_string(),
                TriggerAction::Shutdown,
                "/usr/bin/linode-cli linodes shutdown 123".to_string()
            ),
        ]
    );

    assert_eq!(report.backup.disk.id.as_str(), "d1");
    assert_eq!(report.backup.created.label, "Backup-20250602-1755");
    assert_eq!(
        report.backup.created.description.as_deref(),
        Some("Backup of Linode ID 123")
    );
    assert_eq!(report.backup.deleted.len(), 1);
    assert_eq!(report.backup.deleted[0].as_str(), "private/1");

    let descriptions: Vec<Option<String>> =
        provider.images().into_iter().map(|i| i.description).collect();
    assert_eq!(
        descriptions,
        vec![
            Some("Backup of Linode ID 456".to_string()),
            Some("Backup of Linode ID 123".to_string()),
        ]
    );
}

#[test]
fn rerun_keeps_one_set_of_triggers() {
    let instance = InstanceId::new("123").unwrap();
    let window = DailyWindow::parse("09:00", "18:00").unwrap();
    let provider = FakeProvider::new().with_disks("123", &["d1"]);
    let scheduler = scheduler(RegistrationPolicy::Upsert);
    let orchestrator = Orchestrator::new(&provider, &scheduler).readiness(no_wait());

    orchestrator.run_at(&instance, &window, backup_time()).unwrap();
    orchestrator.run_at(&instance, &window, backup_time()).unwrap();

    assert_eq!(scheduler.triggers(Some(&instance)).unwrap().len(), 3);
    let backups: Vec<_> = provider
        .images()
        .into_iter()
        .filter(|i| i.description.as_deref() == Some("Backup of Linode ID 123"))
        .collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn rerun_with_append_policy_duplicates_triggers() {
    let instance = InstanceId::new("123").unwrap();
    let window = DailyWindow::parse("09:00", "18:00").unwrap();
    let provider = FakeProvider::new().with_disks("123", &["d1"]);
    let scheduler = scheduler(RegistrationPolicy::Append);
    let orchestrator = Orchestrator::new(&provider, &scheduler).readiness(no_wait());

    orchestrator.run_at(&instance, &window, backup_time()).unwrap();
    orchestrator.run_at(&instance, &window, backup_time()).unwrap();

    assert_eq!(scheduler.triggers(Some(&instance)).unwrap().len(), 6);
}

#[test]
fn midnight_borrow_is_rejected_before_any_side_effect() {
    let instance = InstanceId::new("123").unwrap();
    let window = DailyWindow::parse("09:00", "00:03").unwrap();
    let provider = FakeProvider::new().with_disks("123", &["d1"]);
    let scheduler = scheduler(RegistrationPolicy::Upsert);

    let err = Orchestrator::new(&provider, &scheduler)
        .readiness(no_wait())
        .run_at(&instance, &window, backup_time())
        .unwrap_err();

    assert!(matches!(
        err,
        Error::StepFailed {
            step: Step::ResolveWindow,
            ..
        }
    ));
    assert!(matches!(err.root(), Error::InvalidTimeInput(_)));
    assert!(provider.calls().is_empty());
    assert!(scheduler.triggers(None).unwrap().is_empty());
}

#[test]
fn scheduler_failure_stops_before_backup() {
    let instance = InstanceId::new("123").unwrap();
    let window = DailyWindow::parse("09:00", "18:00").unwrap();
    let provider = FakeProvider::new().with_disks("123", &["d1"]);
    let scheduler = Scheduler::new(MemoryTriggerStore::unavailable());

    let err = Orchestrator::new(&provider, &scheduler)
        .readiness(no_wait())
        .run_at(&instance, &window, backup_time())
        .unwrap_err();

    assert!(err.to_string().starts_with("Trigger scheduling failed"));
    assert!(matches!(err.root(), Error::SchedulerUnavailable(_)));
    assert!(!provider.calls().contains(&Call::ListImages));
}

#[test]
fn missing_disk_fails_the_backup_step() {
    let instance = InstanceId::new("123").unwrap();
    let window = DailyWindow::parse("09:00", "18:00").unwrap();
    let provider = FakeProvider::new();
    let scheduler = scheduler(RegistrationPolicy::Upsert);

    let err = Orchestrator::new(&provider, &scheduler)
        .readiness(no_wait())
        .run_at(&instance, &window, backup_time())
        .unwrap_err();

    assert!(matches!(
        err,
        Error::StepFailed {
            step: Step::Backup,
            ..
        }
    ));
    assert!(matches!(err.root(), Error::NoDiskFound(_)));
    // Triggers registered before the failure stay in place.
    assert_eq!(scheduler.triggers(Some(&instance)).unwrap().len(), 3);
}
