//! Trigger times derived from a daily window

use crate::error::{Error, Result};
use crate::types::{ClockTime, DailyWindow};

/// Minutes between the backup trigger and the scheduled shutdown
pub const BACKUP_LEAD_MINUTES: u8 = 5;

/// The three times of day at which triggers fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerTimes {
    pub boot: ClockTime,
    pub backup: ClockTime,
    pub shutdown: ClockTime,
}

impl TriggerTimes {
    pub fn resolve(window: &DailyWindow) -> Result<Self> {
        Ok(TriggerTimes {
            boot: window.start,
            backup: derive_backup_time(window.end)?,
            shutdown: window.end,
        })
    }
}

/// The time `BACKUP_LEAD_MINUTES` before `end`.
///
/// Borrows an hour when the minute underflows. End times that would need to
/// borrow from hour 0 are rejected rather than wrapped to the previous day.
pub fn derive_backup_time(end: ClockTime) -> Result<ClockTime> {
    if end.minute() >= BACKUP_LEAD_MINUTES {
        return ClockTime::new(end.hour(), end.minute() - BACKUP_LEAD_MINUTES);
    }

    let hour = end.hour().checked_sub(1).ok_or_else(|| {
        Error::InvalidTimeInput(format!(
            "end time {} too close to midnight for backup offset",
            end
        ))
    })?;
    ClockTime::new(hour, end.minute() + 60 - BACKUP_LEAD_MINUTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    #[test]
    fn no_borrow_when_minutes_suffice() {
        assert_eq!(derive_backup_time(at("14:30")).unwrap(), at("14:25"));
        assert_eq!(derive_backup_time(at("18:00")).unwrap(), at("17:55"));
        assert_eq!(derive_backup_time(at("00:05")).unwrap(), at("00:00"));
        assert_eq!(derive_backup_time(at("23:59")).unwrap(), at("23:54"));
    }

    #[test]
    fn borrows_an_hour_on_minute_underflow() {
        assert_eq!(derive_backup_time(at("14:03")).unwrap(), at("13:58"));
        assert_eq!(derive_backup_time(at("01:04")).unwrap(), at("00:59"));
        assert_eq!(derive_backup_time(at("10:00")).unwrap().to_string(), "09:55");
    }

    #[test]
    fn every_valid_end_time_yields_a_valid_backup_time_or_an_error() {
        for hour in 0..24 {
            for minute in 0..60 {
                let end = ClockTime::new(hour, minute).unwrap();
                match derive_backup_time(end) {
                    Ok(backup) => {
                        assert!(backup.hour() <= 23 && backup.minute() <= 59);
                        let end_total = u32::from(hour) * 60 + u32::from(minute);
                        let backup_total =
                            u32::from(backup.hour()) * 60 + u32::from(backup.minute());
                        assert_eq!(end_total - backup_total, u32::from(BACKUP_LEAD_MINUTES));
                    }
                    Err(e) => {
                        assert!(hour == 0 && minute < BACKUP_LEAD_MINUTES, "{end}: {e}");
                        assert!(matches!(e, Error::InvalidTimeInput(_)));
                    }
                }
            }
        }
    }

    #[test]
    fn rejects_end_just_after_midnight() {
        let err = derive_backup_time(at("00:03")).unwrap_err();
        assert!(err.to_string().contains("too close to midnight"));
    }

    #[test]
    fn resolves_all_three_trigger_times() {
        let window = DailyWindow::parse("09:00", "18:00").unwrap();
        let times = TriggerTimes::resolve(&window).unwrap();
        assert_eq!(times.boot, at("09:00"));
        assert_eq!(times.backup, at("17:55"));
        assert_eq!(times.shutdown, at("18:00"));
    }
}
