//! Linode CLI provider implementation

use crate::error::{Error, Result};
use crate::provider::InstanceProvider;
use crate::types::{Disk, DiskId, Image, ImageId, InstanceId, InstanceStatus};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::process::Command;
use tracing::debug;

/// Configuration for the Linode CLI provider
#[derive(Debug, Clone)]
pub struct LinodeCliConfig {
    /// Program to invoke (e.g., linode-cli, or an absolute path)
    pub program: String,
}

impl Default for LinodeCliConfig {
    fn default() -> Self {
        Self {
            program: "linode-cli".to_string(),
        }
    }
}

/// Only the field the readiness check needs from `linodes view`
#[derive(Debug, Deserialize)]
struct LinodeView {
    status: InstanceStatus,
}

/// Provider backed by the `linode-cli` command-line tool
///
/// Output is requested as JSON and parsed directly. The CLI must already be
/// configured with an API token for the account owning the instance.
pub struct LinodeCliProvider {
    config: LinodeCliConfig,
}

impl LinodeCliProvider {
    /// Create a new provider with default configuration
    pub fn new() -> Self {
        Self::with_config(LinodeCliConfig::default())
    }

    /// Create a new provider with custom configuration
    pub fn with_config(config: LinodeCliConfig) -> Self {
        Self { config }
    }

    /// Run linode-cli and return stdout
    fn run_command(&self, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.config.program, args.join(" "));
        debug!(%command, "running provider command");

        let output = Command::new(&self.config.program)
            .args(args)
            .output()
            .map_err(|e| Error::ProviderCallFailed {
                command: command.clone(),
                stderr: e.to_string(),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(Error::ProviderCallFailed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    /// Run linode-cli with `--json` and parse the resulting array
    fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>> {
        let mut args = args.to_vec();
        args.push("--json");
        let output = self.run_command(&args)?;
        Ok(serde_json::from_str(&output)?)
    }

    /// Like `run_json`, for commands that describe a single object
    fn run_json_single<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        self.run_json(args)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::ProviderCallFailed {
                command: format!("{} {} --json", self.config.program, args.join(" ")),
                stderr: "command returned no objects".to_string(),
            })
    }
}

impl Default for LinodeCliProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceProvider for LinodeCliProvider {
    fn list_images(&self) -> Result<Vec<Image>> {
        // Without --all-rows only the first page comes back, and public
        // distribution images fill most of it.
        self.run_json(&["images", "list", "--all-rows"])
    }

    fn delete_image(&self, id: &ImageId) -> Result<()> {
        self.run_command(&["images", "delete", id.as_str()])?;
        Ok(())
    }

    fn create_image(&self, disk: &DiskId, label: &str, description: &str) -> Result<Image> {
        self.run_json_single(&[
            "images",
            "create",
            "--disk_id",
            disk.as_str(),
            "--label",
            label,
            "--description",
            description,
        ])
    }

    fn list_disks(&self, instance: &InstanceId) -> Result<Vec<Disk>> {
        self.run_json(&["linodes", "disks-list", instance.as_str()])
    }

    fn instance_status(&self, instance: &InstanceId) -> Result<InstanceStatus> {
        let view: LinodeView = self.run_json_single(&["linodes", "view", instance.as_str()])?;
        Ok(view.status)
    }

    fn start_instance(&self, instance: &InstanceId) -> Result<()> {
        self.run_command(&["linodes", "boot", instance.as_str()])?;
        Ok(())
    }

    fn stop_instance(&self, instance: &InstanceId) -> Result<()> {
        self.run_command(&["linodes", "shutdown", instance.as_str()])?;
        Ok(())
    }
}
