//! Daily trigger registration
//!
//! Triggers are stored behind the [`TriggerStore`] port so the host crontab
//! can be swapped for an in-memory store in tests. Every managed trigger is
//! keyed by `(instance, action)`; with the default [`RegistrationPolicy::Upsert`]
//! re-running a setup replaces the previous entries instead of piling up
//! duplicates.

mod crontab;

pub use crontab::CrontabStore;

use crate::backup::PruneOrder;
use crate::error::{Error, Result};
use crate::types::{ClockTime, InstanceId};
use crate::window::TriggerTimes;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// What a trigger does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerAction {
    /// Boot the instance at the start of the window
    Boot,
    /// Take an image backup, then shut down
    BackupAndShutdown,
    /// Shut the instance down at the end of the window
    Shutdown,
}

impl TriggerAction {
    pub const ALL: [TriggerAction; 3] = [
        TriggerAction::Boot,
        TriggerAction::BackupAndShutdown,
        TriggerAction::Shutdown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerAction::Boot => "boot",
            TriggerAction::BackupAndShutdown => "backup",
            TriggerAction::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for TriggerAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "boot" => Ok(TriggerAction::Boot),
            "backup" => Ok(TriggerAction::BackupAndShutdown),
            "shutdown" => Ok(TriggerAction::Shutdown),
            _ => Err(format!("Unknown trigger action '{}'", s)),
        }
    }
}

/// Identity of a managed trigger
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerKey {
    pub instance: InstanceId,
    pub action: TriggerAction,
}

/// A daily trigger: run `command` every day at `time`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub key: TriggerKey,
    pub time: ClockTime,
    pub command: String,
}

/// Storage for daily triggers
pub trait TriggerStore {
    /// List the triggers managed by this tool, in storage order
    fn list(&self) -> Result<Vec<Trigger>>;

    /// Append a trigger without looking at existing entries
    fn append(&self, trigger: &Trigger) -> Result<()>;

    /// Remove every trigger with `key`, returning how many were removed
    fn remove(&self, key: &TriggerKey) -> Result<usize>;
}

/// How registration treats an existing trigger with the same key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationPolicy {
    /// Replace existing entries for the key
    #[default]
    Upsert,
    /// Always append; repeated runs accumulate duplicates
    Append,
}

/// Configuration for the commands triggers run
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// linode-cli as seen from cron's minimal PATH
    pub linode_cli_path: String,
    /// Command that backs up and shuts down; the instance ID is appended
    pub backup_command: String,
    pub policy: RegistrationPolicy,
}

impl SchedulerConfig {
    /// Triggers that run `program`'s own `backup` subcommand, passing on the
    /// linode-cli path and prune order so the nightly backup behaves like the
    /// setup run that scheduled it
    pub fn for_program(program: &str, linode_cli_path: &str, order: PruneOrder) -> Self {
        let mut backup_command = format!(
            "{} backup --shutdown --linode-cli {}",
            shell_quote(program),
            shell_quote(linode_cli_path)
        );
        if order == PruneOrder::BeforeCreate {
            backup_command.push_str(" --prune-first");
        }

        Self {
            linode_cli_path: linode_cli_path.to_string(),
            backup_command,
            policy: RegistrationPolicy::default(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let program = std::env::current_exe()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|_| "linode-lifecycle".to_string());

        Self::for_program(&program, "/usr/bin/linode-cli", PruneOrder::default())
    }
}

/// Quote `word` for the `/bin/sh` that cron runs entries with
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', "'\\''"))
    }
}

/// Registers the daily boot, backup and shutdown triggers for an instance
pub struct Scheduler<S> {
    store: S,
    config: SchedulerConfig,
}

impl<S: TriggerStore> Scheduler<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SchedulerConfig::default())
    }

    pub fn with_config(store: S, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The command line a trigger runs for `instance`
    pub fn command_for(&self, instance: &InstanceId, action: TriggerAction) -> String {
        match action {
            TriggerAction::Boot => format!(
                "{} linodes boot {}",
                shell_quote(&self.config.linode_cli_path),
                instance
            ),
            TriggerAction::BackupAndShutdown => {
                format!("{} {}", self.config.backup_command, instance)
            }
            TriggerAction::Shutdown => format!(
                "{} linodes shutdown {}",
                shell_quote(&self.config.linode_cli_path),
                instance
            ),
        }
    }

    /// Register one daily trigger according to the configured policy
    pub fn register_daily_trigger(&self, trigger: &Trigger) -> Result<()> {
        // cron turns an unescaped '%' into a newline
        if trigger.command.contains(&['%', '\n', '\r'][..]) {
            return Err(Error::InvalidCommand(trigger.command.clone()));
        }

        if self.config.policy == RegistrationPolicy::Upsert {
            let replaced = self.store.remove(&trigger.key)?;
            if replaced > 0 {
                info!(
                    instance = %trigger.key.instance,
                    action = %trigger.key.action,
                    replaced,
                    "replacing existing trigger"
                );
            }
        }
        self.store.append(trigger)
    }

    /// Register the boot, backup and shutdown triggers for `instance`.
    ///
    /// The shutdown at the end of the window fires even though the backup
    /// trigger five minutes earlier also shuts the instance down.
    pub fn schedule_window(
        &self,
        instance: &InstanceId,
        times: &TriggerTimes,
    ) -> Result<Vec<Trigger>> {
        let mut registered = Vec::with_capacity(TriggerAction::ALL.len());

        for action in TriggerAction::ALL {
            let time = match action {
                TriggerAction::Boot => times.boot,
                TriggerAction::BackupAndShutdown => times.backup,
                TriggerAction::Shutdown => times.shutdown,
            };
            let trigger = Trigger {
                key: TriggerKey {
                    instance: instance.clone(),
                    action,
                },
                time,
                command: self.command_for(instance, action),
            };

            self.register_daily_trigger(&trigger)?;
            info!(%instance, %action, %time, "registered daily trigger");
            registered.push(trigger);
        }

        Ok(registered)
    }

    /// Managed triggers, optionally only those of one instance
    pub fn triggers(&self, instance: Option<&InstanceId>) -> Result<Vec<Trigger>> {
        let mut triggers = self.store.list()?;
        if let Some(instance) = instance {
            triggers.retain(|t| &t.key.instance == instance);
        }
        Ok(triggers)
    }

    /// Remove every trigger of `instance`
    pub fn clear(&self, instance: &InstanceId) -> Result<usize> {
        let mut removed = 0;
        for action in TriggerAction::ALL {
            removed += self.store.remove(&TriggerKey {
                instance: instance.clone(),
                action,
            })?;
        }
        Ok(removed)
    }
}
