//! In-memory provider and trigger store, for tests.

use crate::error::{Error, Result};
use crate::provider::InstanceProvider;
use crate::scheduler::{Trigger, TriggerKey, TriggerStore};
use crate::types::{Disk, DiskId, Image, ImageId, InstanceId, InstanceStatus};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};

/// A provider call, as recorded by [`FakeProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListImages,
    DeleteImage(String),
    CreateImage {
        disk: String,
        label: String,
        description: String,
    },
    ListDisks(String),
    InstanceStatus(String),
    StartInstance(String),
    StopInstance(String),
}

/// Provider keeping images, disks and statuses in memory
///
/// Statuses are replayed in order per instance, repeating the last one;
/// instances without configured statuses report `Running`.
#[derive(Debug, Default)]
pub struct FakeProvider {
    images: RefCell<Vec<Image>>,
    disks: HashMap<String, Vec<Disk>>,
    statuses: RefCell<HashMap<String, VecDeque<InstanceStatus>>>,
    failing: HashSet<&'static str>,
    calls: RefCell<Vec<Call>>,
    next_image: Cell<u64>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            next_image: Cell::new(1000),
            ..Self::default()
        }
    }

    pub fn with_image(self, id: &str, description: &str) -> Self {
        self.images.borrow_mut().push(Image {
            id: ImageId::new(id),
            label: format!("image-{}", id),
            description: Some(description.to_string()),
        });
        self
    }

    pub fn with_disks(mut self, instance: &str, ids: &[&str]) -> Self {
        let disks = ids
            .iter()
            .map(|id| Disk {
                id: DiskId::new(*id),
                label: format!("disk-{}", id),
            })
            .collect();
        self.disks.insert(instance.to_string(), disks);
        self
    }

    pub fn with_status(self, instance: &str, statuses: &[InstanceStatus]) -> Self {
        self.statuses
            .borrow_mut()
            .insert(instance.to_string(), statuses.iter().copied().collect());
        self
    }

    /// Make every call to `operation` (a trait method name) fail
    pub fn failing_on(mut self, operation: &'static str) -> Self {
        self.failing.insert(operation);
        self
    }

    pub fn images(&self) -> Vec<Image> {
        self.images.borrow().clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<()> {
        self.calls.borrow_mut().push(call);
        if self.failing.contains(operation) {
            return Err(Error::ProviderCallFailed {
                command: format!("fake {}", operation),
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl InstanceProvider for FakeProvider {
    fn list_images(&self) -> Result<Vec<Image>> {
        self.record("list_images", Call::ListImages)?;
        Ok(self.images())
    }

    fn delete_image(&self, id: &ImageId) -> Result<()> {
        self.record("delete_image", Call::DeleteImage(id.to_string()))?;
        self.images.borrow_mut().retain(|image| &image.id != id);
        Ok(())
    }

    fn create_image(&self, disk: &DiskId, label: &str, description: &str) -> Result<Image> {
        self.record(
            "create_image",
            Call::CreateImage {
                disk: disk.to_string(),
                label: label.to_string(),
                description: description.to_string(),
            },
        )?;

        let n = self.next_image.get();
        self.next_image.set(n + 1);
        let image = Image {
            id: ImageId::new(format!("private/{}", n)),
            label: label.to_string(),
            description: Some(description.to_string()),
        };
        self.images.borrow_mut().push(image.clone());
        Ok(image)
    }

    fn list_disks(&self, instance: &InstanceId) -> Result<Vec<Disk>> {
        self.record("list_disks", Call::ListDisks(instance.to_string()))?;
        Ok(self.disks.get(instance.as_str()).cloned().unwrap_or_default())
    }

    fn instance_status(&self, instance: &InstanceId) -> Result<InstanceStatus> {
        self.record("instance_status", Call::InstanceStatus(instance.to_string()))?;
        let mut statuses = self.statuses.borrow_mut();
        let Some(queue) = statuses.get_mut(instance.as_str()) else {
            return Ok(InstanceStatus::Running);
        };
        let status = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        Ok(status.unwrap_or(InstanceStatus::Running))
    }

    fn start_instance(&self, instance: &InstanceId) -> Result<()> {
        self.record("start_instance", Call::StartInstance(instance.to_string()))
    }

    fn stop_instance(&self, instance: &InstanceId) -> Result<()> {
        self.record("stop_instance", Call::StopInstance(instance.to_string()))
    }
}

/// Trigger store kept in a vector
#[derive(Debug, Default)]
pub struct MemoryTriggerStore {
    triggers: RefCell<Vec<Trigger>>,
    unavailable: bool,
}

impl MemoryTriggerStore {
    /// A store whose every operation fails with `SchedulerUnavailable`
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.unavailable {
            return Err(Error::SchedulerUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl TriggerStore for MemoryTriggerStore {
    fn list(&self) -> Result<Vec<Trigger>> {
        self.check()?;
        Ok(self.triggers.borrow().clone())
    }

    fn append(&self, trigger: &Trigger) -> Result<()> {
        self.check()?;
        self.triggers.borrow_mut().push(trigger.clone());
        Ok(())
    }

    fn remove(&self, key: &TriggerKey) -> Result<usize> {
        self.check()?;
        let mut triggers = self.triggers.borrow_mut();
        let before = triggers.len();
        triggers.retain(|t| &t.key != key);
        Ok(before - triggers.len())
    }
}
