//! Core types for linode-lifecycle

use crate::error::Error;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::str::FromStr;

/// Prefix of the description that ties a backup image to its instance
pub const BACKUP_DESCRIPTION_PREFIX: &str = "Backup of Linode ID ";

/// Prefix of every backup image label
pub const BACKUP_LABEL_PREFIX: &str = "Backup-";

/// The managed instance's identifier (a Linode ID)
///
/// Restricted to ASCII alphanumerics, `-` and `_` because it is embedded in
/// crontab lines and command arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create a new instance ID
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::InvalidInstanceId(id));
        }
        Ok(InstanceId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl FromStr for InstanceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstanceId::new(s.trim())
    }
}

/// Provider-assigned image ID (e.g. `private/1234567`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        ImageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for ImageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawId::deserialize(deserializer).map(|raw| ImageId(raw.into_string()))
    }
}

/// Provider-assigned disk ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiskId(String);

impl DiskId {
    pub fn new(id: impl Into<String>) -> Self {
        DiskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for DiskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawId::deserialize(deserializer).map(|raw| DiskId(raw.into_string()))
    }
}

/// The Linode API returns numeric IDs for disks and string IDs for images
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

/// An image as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Image {
    pub id: ImageId,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Image {
    /// Whether this image is a backup owned by `instance`
    pub fn is_backup_of(&self, instance: &InstanceId) -> bool {
        self.description.as_deref() == Some(backup_description(instance).as_str())
    }
}

/// A disk attached to an instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Disk {
    pub id: DiskId,
    #[serde(default)]
    pub label: String,
}

/// Instance status as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Running,
    Offline,
    Booting,
    Rebooting,
    ShuttingDown,
    Provisioning,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, InstanceStatus::Running)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceStatus::Running => "running",
            InstanceStatus::Offline => "offline",
            InstanceStatus::Booting => "booting",
            InstanceStatus::Rebooting => "rebooting",
            InstanceStatus::ShuttingDown => "shutting_down",
            InstanceStatus::Provisioning => "provisioning",
            InstanceStatus::Stopped => "stopped",
            InstanceStatus::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A local wall-clock time of day, written as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, Error> {
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidTimeInput(format!(
                "{:02}:{:02} is not a valid time of day",
                hour, minute
            )));
        }
        Ok(ClockTime { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("{:02}:{:02}", self.hour, self.minute))
    }
}

impl FromStr for ClockTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::InvalidTimeInput(format!(
                "'{}' is not in HH:MM format (24-hour, leading zeros)",
                s
            ))
        };

        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
        if !two_digits(hour) || !two_digits(minute) {
            return Err(invalid());
        }

        let hour = hour.parse().map_err(|_| invalid())?;
        let minute = minute.parse().map_err(|_| invalid())?;
        ClockTime::new(hour, minute)
    }
}

/// The daily operating hours of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl DailyWindow {
    pub fn new(start: ClockTime, end: ClockTime) -> Self {
        DailyWindow { start, end }
    }

    /// Parse a window from two `HH:MM` strings
    pub fn parse(start: &str, end: &str) -> Result<Self, Error> {
        Ok(DailyWindow::new(start.parse()?, end.parse()?))
    }
}

impl fmt::Display for DailyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// The description every backup of `instance` carries
pub fn backup_description(instance: &InstanceId) -> String {
    format!("{}{}", BACKUP_DESCRIPTION_PREFIX, instance)
}
