//! Timestamp conversions.
//!
//! ZIP carries timestamps in three encodings: the mandatory DOS date/time
//! pair (local time, 2-second resolution, years 1980-2107), NTFS FILETIME
//! values (100ns ticks since 1601-01-01 UTC) and Unix seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ::time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_EPOCH_DELTA_SECS: u64 = 11_644_473_600;

/// FILETIME ticks per second.
const FILETIME_TICKS_PER_SEC: u64 = 10_000_000;

/// DOS date/time pair as stored in ZIP headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    /// Date word: bits 15-9 year since 1980, 8-5 month, 4-0 day.
    pub date: u16,
    /// Time word: bits 15-11 hour, 10-5 minute, 4-0 seconds / 2.
    pub time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable value.
    pub const MIN: Self = Self {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// Convert from a system time, in the local time zone.
    pub fn from_system_time(t: SystemTime) -> Self {
        let local = OffsetDateTime::from(t).to_offset(local_offset());
        let year = local.year();
        if !(1980..=2107).contains(&year) {
            return Self::MIN;
        }
        let date = (((year - 1980) as u16) << 9) | ((local.month() as u16) << 5) | local.day() as u16;
        let time = ((local.hour() as u16) << 11)
            | ((local.minute() as u16) << 5)
            | (local.second() as u16 / 2);
        Self { date, time }
    }

    /// Convert to a system time, interpreting the fields as local time.
    ///
    /// Returns `None` for out-of-range fields (month 0, hour 25, ...).
    pub fn to_system_time(self) -> Option<SystemTime> {
        let year = 1980 + i32::from(self.date >> 9);
        let month = Month::try_from(((self.date >> 5) & 0x0F) as u8).ok()?;
        let day = (self.date & 0x1F) as u8;
        let hour = (self.time >> 11) as u8;
        let minute = ((self.time >> 5) & 0x3F) as u8;
        let second = ((self.time & 0x1F) * 2) as u8;

        let date = Date::from_calendar_date(year, month, day).ok()?;
        let time = Time::from_hms(hour, minute, second).ok()?;
        let local = PrimitiveDateTime::new(date, time).assume_offset(local_offset());
        Some(SystemTime::from(local))
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::MIN
    }
}

/// The local UTC offset, falling back to UTC when it cannot be determined.
pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

/// Convert a system time to NTFS FILETIME ticks.
pub fn system_time_to_filetime(t: SystemTime) -> u64 {
    let epoch_delta = Duration::from_secs(FILETIME_EPOCH_DELTA_SECS);
    match t.duration_since(UNIX_EPOCH) {
        Ok(since_unix) => {
            let since_1601 = since_unix + epoch_delta;
            since_1601.as_secs() * FILETIME_TICKS_PER_SEC + u64::from(since_1601.subsec_nanos()) / 100
        }
        Err(before) => {
            let before = before.duration();
            let since_1601 = epoch_delta.saturating_sub(before);
            since_1601.as_secs() * FILETIME_TICKS_PER_SEC + u64::from(since_1601.subsec_nanos()) / 100
        }
    }
}

/// Convert NTFS FILETIME ticks to a system time.
pub fn filetime_to_system_time(ticks: u64) -> SystemTime {
    let secs = ticks / FILETIME_TICKS_PER_SEC;
    let nanos = ((ticks % FILETIME_TICKS_PER_SEC) * 100) as u32;
    let since_1601 = Duration::new(secs, nanos);
    let epoch_delta = Duration::from_secs(FILETIME_EPOCH_DELTA_SECS);
    if since_1601 >= epoch_delta {
        UNIX_EPOCH + (since_1601 - epoch_delta)
    } else {
        UNIX_EPOCH - (epoch_delta - since_1601)
    }
}

/// Convert a system time to whole Unix seconds.
pub fn system_time_to_unix(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Convert Unix seconds to a system time.
pub fn unix_to_system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}
