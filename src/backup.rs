//! Image backups of an instance's primary disk

use crate::error::{Error, Result};
use crate::provider::InstanceProvider;
use crate::types::{backup_description, Disk, Image, ImageId, InstanceId, BACKUP_LABEL_PREFIX};
use chrono::{Local, NaiveDateTime};
use tracing::{info, warn};

/// When stale backups are deleted relative to creating the new one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PruneOrder {
    /// Create first, then delete the old backups. A failed create leaves
    /// the previous backups in place.
    #[default]
    AfterCreate,
    /// Delete first, then create. Needed when the account is at its image
    /// quota; a failed create leaves the instance with no backup.
    BeforeCreate,
}

/// Result of a completed backup cycle
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub disk: Disk,
    pub created: Image,
    pub deleted: Vec<ImageId>,
}

/// The label for a backup taken at `taken_at`
pub fn backup_label(taken_at: NaiveDateTime) -> String {
    format!("{}{}", BACKUP_LABEL_PREFIX, taken_at.format("%Y%m%d-%H%M"))
}

/// Keeps exactly one image backup per instance
pub struct BackupManager<'a, P> {
    provider: &'a P,
    order: PruneOrder,
}

impl<'a, P: InstanceProvider> BackupManager<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self::with_order(provider, PruneOrder::default())
    }

    pub fn with_order(provider: &'a P, order: PruneOrder) -> Self {
        Self { provider, order }
    }

    /// Back up `instance`, labelled with the current local time
    pub fn create_image_backup(&self, instance: &InstanceId) -> Result<BackupReport> {
        self.create_image_backup_at(instance, Local::now().naive_local())
    }

    /// Back up `instance`, labelled with `taken_at`
    pub fn create_image_backup_at(
        &self,
        instance: &InstanceId,
        taken_at: NaiveDateTime,
    ) -> Result<BackupReport> {
        let stale = self.stale_backups(instance)?;

        match self.order {
            PruneOrder::BeforeCreate => {
                let deleted = self.delete_all(&stale)?;
                let disk = self.primary_disk(instance)?;
                let created = self.create(instance, &disk, taken_at)?;
                Ok(BackupReport {
                    disk,
                    created,
                    deleted,
                })
            }
            PruneOrder::AfterCreate => {
                let disk = self.primary_disk(instance)?;
                let created = self.create(instance, &disk, taken_at)?;
                let stale: Vec<Image> = stale
                    .into_iter()
                    .filter(|image| image.id != created.id)
                    .collect();
                let deleted = self.delete_all(&stale)?;
                Ok(BackupReport {
                    disk,
                    created,
                    deleted,
                })
            }
        }
    }

    /// Existing backups of `instance`, matched by description
    pub fn stale_backups(&self, instance: &InstanceId) -> Result<Vec<Image>> {
        info!(%instance, "listing existing backups");
        Ok(self
            .provider
            .list_images()?
            .into_iter()
            .filter(|image| image.is_backup_of(instance))
            .collect())
    }

    /// The first disk the provider lists for `instance`
    pub fn primary_disk(&self, instance: &InstanceId) -> Result<Disk> {
        info!(%instance, "resolving primary disk");
        self.provider
            .list_disks(instance)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NoDiskFound(instance.clone()))
    }

    fn create(&self, instance: &InstanceId, disk: &Disk, taken_at: NaiveDateTime) -> Result<Image> {
        let label = backup_label(taken_at);
        info!(%instance, disk = %disk.id, %label, "creating image");
        self.provider
            .create_image(&disk.id, &label, &backup_description(instance))
    }

    fn delete_all(&self, images: &[Image]) -> Result<Vec<ImageId>> {
        let mut deleted = Vec::with_capacity(images.len());
        for image in images {
            info!(image = %image.id, label = %image.label, "deleting old backup");
            self.provider.delete_image(&image.id).map_err(|e| {
                warn!(image = %image.id, "delete failed, aborting backup cycle");
                e
            })?;
            deleted.push(image.id.clone());
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{Call, FakeProvider};
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(hour, minute, 42)
            .unwrap()
    }

    fn instance(id: &str) -> InstanceId {
        InstanceId::new(id).unwrap()
    }

    #[test]
    fn label_has_minute_granularity() {
        assert_eq!(backup_label(at(17, 55)), "Backup-20250314-1755");
        assert_eq!(backup_label(at(7, 5)), "Backup-20250314-0705");
    }

    #[test]
    fn prunes_only_the_matching_instance() {
        let provider = FakeProvider::new()
            .with_image("private/1", "Backup of Linode ID A")
            .with_image("private/2", "Backup of Linode ID B")
            .with_disks("A", &["d1"]);

        let report = BackupManager::new(&provider)
            .create_image_backup_at(&instance("A"), at(17, 55))
            .unwrap();

        assert_eq!(report.deleted, vec![ImageId::new("private/1")]);
        let remaining: Vec<String> = provider
            .images()
            .iter()
            .map(|i| i.description.clone().unwrap_or_default())
            .collect();
        assert_eq!(remaining, vec!["Backup of Linode ID B", "Backup of Linode ID A"]);
    }

    #[test]
    fn always_picks_the_first_disk() {
        let provider = FakeProvider::new().with_disks("123", &["d2", "d1"]);
        let manager = BackupManager::new(&provider);
        assert_eq!(manager.primary_disk(&instance("123")).unwrap().id.as_str(), "d2");

        let provider = FakeProvider::new().with_disks("123", &["d1", "d2"]);
        let report = BackupManager::new(&provider)
            .create_image_backup_at(&instance("123"), at(17, 55))
            .unwrap();
        assert_eq!(report.disk.id.as_str(), "d1");
        assert_eq!(report.created.label, "Backup-20250314-1755");
        assert_eq!(
            report.created.description.as_deref(),
            Some("Backup of Linode ID 123")
        );
    }

    #[test]
    fn no_disk_is_fatal_and_keeps_old_backups() {
        let provider = FakeProvider::new().with_image("private/9", "Backup of Linode ID 123");

        let err = BackupManager::new(&provider)
            .create_image_backup_at(&instance("123"), at(17, 55))
            .unwrap_err();

        assert!(matches!(err, Error::NoDiskFound(ref id) if id.as_str() == "123"));
        assert_eq!(provider.images().len(), 1);
    }

    #[test]
    fn failed_create_keeps_old_backup_by_default() {
        let provider = FakeProvider::new()
            .with_image("private/9", "Backup of Linode ID 123")
            .with_disks("123", &["d1"])
            .failing_on("create_image");

        let err = BackupManager::new(&provider)
            .create_image_backup_at(&instance("123"), at(17, 55))
            .unwrap_err();

        assert!(matches!(err, Error::ProviderCallFailed { .. }));
        assert_eq!(provider.images()[0].id.as_str(), "private/9");
    }

    #[test]
    fn delete_first_order_follows_list_delete_resolve_create() {
        let provider = FakeProvider::new()
            .with_image("private/9", "Backup of Linode ID 123")
            .with_disks("123", &["d1"]);

        BackupManager::with_order(&provider, PruneOrder::BeforeCreate)
            .create_image_backup_at(&instance("123"), at(17, 55))
            .unwrap();

        assert_eq!(
            provider.calls(),
            vec![
                Call::ListImages,
                Call::DeleteImage("private/9".to_string()),
                Call::ListDisks("123".to_string()),
                Call::CreateImage {
                    disk: "d1".to_string(),
                    label: "Backup-20250314-1755".to_string(),
                    description: "Backup of Linode ID 123".to_string(),
                },
            ]
        );
    }

    #[test]
    fn delete_failure_aborts_the_cycle() {
        let provider = FakeProvider::new()
            .with_image("private/8", "Backup of Linode ID 123")
            .with_image("private/9", "Backup of Linode ID 123")
            .with_disks("123", &["d1"])
            .failing_on("delete_image");

        let err = BackupManager::with_order(&provider, PruneOrder::BeforeCreate)
            .create_image_backup_at(&instance("123"), at(17, 55))
            .unwrap_err();

        assert!(matches!(err, Error::ProviderCallFailed { .. }));
        assert!(!provider
            .calls()
            .iter()
            .any(|c| matches!(c, Call::CreateImage { .. } | Call::ListDisks(_))));
        assert_eq!(provider.images().len(), 2);
    }
}
