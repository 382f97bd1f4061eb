//! Crontab-backed trigger store

use super::{Trigger, TriggerKey, TriggerStore};
use crate::error::{Error, Result};
use crate::types::{ClockTime, InstanceId};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// Marks a crontab line as managed, followed by `<instance>:<action>`
const MARKER: &str = " # linode-lifecycle:";

/// Trigger store backed by the invoking user's crontab
///
/// Lines not written by this tool are kept verbatim on every rewrite.
pub struct CrontabStore {
    program: String,
}

impl CrontabStore {
    pub fn new() -> Self {
        Self::with_program("crontab")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Read every line of the current crontab
    fn read_lines(&self) -> Result<Vec<String>> {
        debug!(program = %self.program, "reading crontab");
        let output = Command::new(&self.program)
            .arg("-l")
            .output()
            .map_err(|e| unavailable(&self.program, "-l", &e.to_string()))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::to_string)
                .collect());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("no crontab") {
            Ok(Vec::new())
        } else {
            Err(unavailable(&self.program, "-l", &stderr))
        }
    }

    /// Replace the crontab with `lines`
    fn write_lines(&self, lines: &[String]) -> Result<()> {
        debug!(program = %self.program, lines = lines.len(), "writing crontab");
        let mut child = Command::new(&self.program)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| unavailable(&self.program, "-", &e.to_string()))?;

        let mut content = lines.join("\n");
        content.push('\n');
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(content.as_bytes())
                .map_err(|e| unavailable(&self.program, "-", &e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| unavailable(&self.program, "-", &e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(unavailable(
                &self.program,
                "-",
                &String::from_utf8_lossy(&output.stderr),
            ))
        }
    }
}

impl Default for CrontabStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerStore for CrontabStore {
    fn list(&self) -> Result<Vec<Trigger>> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|line| parse_line(line))
            .collect())
    }

    fn append(&self, trigger: &Trigger) -> Result<()> {
        let mut lines = self.read_lines()?;
        lines.push(format_line(trigger));
        self.write_lines(&lines)
    }

    fn remove(&self, key: &TriggerKey) -> Result<usize> {
        let lines = self.read_lines()?;
        let (kept, removed) = without_key(lines, key);
        if removed > 0 {
            self.write_lines(&kept)?;
        }
        Ok(removed)
    }
}

fn unavailable(program: &str, arg: &str, reason: &str) -> Error {
    Error::SchedulerUnavailable(format!("{} {}: {}", program, arg, reason.trim()))
}

/// Render a trigger as a daily crontab entry
pub(crate) fn format_line(trigger: &Trigger) -> String {
    format!(
        "{:02} {:02} * * * {}{}{}:{}",
        trigger.time.minute(),
        trigger.time.hour(),
        trigger.command,
        MARKER,
        trigger.key.instance,
        trigger.key.action
    )
}

/// Parse a managed crontab entry; unmanaged or foreign lines yield `None`
pub(crate) fn parse_line(line: &str) -> Option<Trigger> {
    let (entry, tag) = line.rsplit_once(MARKER)?;
    let (instance, action) = tag.trim().split_once(':')?;
    let key = TriggerKey {
        instance: InstanceId::new(instance).ok()?,
        action: action.parse().ok()?,
    };

    let mut fields = entry.splitn(6, ' ');
    let minute = fields.next()?.parse().ok()?;
    let hour = fields.next()?.parse().ok()?;
    for _ in 0..3 {
        if fields.next()? != "*" {
            return None;
        }
    }
    let command = fields.next()?.to_string();

    Some(Trigger {
        key,
        time: ClockTime::new(hour, minute).ok()?,
        command,
    })
}

/// Drop the managed lines carrying `key`, keeping everything else in order
fn without_key(lines: Vec<String>, key: &TriggerKey) -> (Vec<String>, usize) {
    let before = lines.len();
    let kept: Vec<String> = lines
        .into_iter()
        .filter(|line| parse_line(line).map_or(true, |t| &t.key != key))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}
