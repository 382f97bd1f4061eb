//! Provider trait and implementations for linode-lifecycle

mod linode_cli;

pub use linode_cli::{LinodeCliConfig, LinodeCliProvider};

use crate::error::Result;
use crate::types::{Disk, DiskId, Image, ImageId, InstanceId, InstanceStatus};

/// Trait defining the instance-management operations the core relies on
///
/// Every call is a blocking round-trip; any failure is reported as an error
/// and treated as fatal by the caller.
pub trait InstanceProvider {
    // === Images ===

    /// List all images visible to the account
    fn list_images(&self) -> Result<Vec<Image>>;

    /// Delete an image
    fn delete_image(&self, id: &ImageId) -> Result<()>;

    /// Create an image from a disk, returning the new image
    fn create_image(&self, disk: &DiskId, label: &str, description: &str) -> Result<Image>;

    // === Disks ===

    /// List the disks attached to an instance, in provider order
    fn list_disks(&self, instance: &InstanceId) -> Result<Vec<Disk>>;

    // === Instance Control ===

    /// Get the instance's current status
    fn instance_status(&self, instance: &InstanceId) -> Result<InstanceStatus>;

    /// Boot the instance
    fn start_instance(&self, instance: &InstanceId) -> Result<()>;

    /// Shut the instance down
    fn stop_instance(&self, instance: &InstanceId) -> Result<()>;
}
