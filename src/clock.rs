// SPDX-License-Identifier: MIT

//! Ledger clock: month and day keys in the configured competition time zone.
//!
//! Every time-scoped operation (quota, ranking, pool, rollover) derives its
//! keys from this clock rather than calling `Utc::now()` directly, so tests
//! can pin the ledger to a fixed instant.

use chrono::{DateTime, FixedOffset, Utc};

/// Clock with an injectable "now" and a fixed-offset competition time zone.
///
/// The zone is a fixed UTC offset (default +02:00), which does not track DST.
#[derive(Debug, Clone)]
pub struct Clock {
    offset: FixedOffset,
    frozen: Option<DateTime<Utc>>,
}

impl Clock {
    /// Create a wall clock for the given offset (minutes east of UTC).
    pub fn new(offset_minutes: i32) -> Self {
        Self {
            offset: FixedOffset::east_opt(offset_minutes * 60)
                .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid")),
            frozen: None,
        }
    }

    /// Create a clock frozen at `now`, for tests.
    pub fn fixed(now: DateTime<Utc>, offset_minutes: i32) -> Self {
        Self {
            frozen: Some(now),
            ..Self::new(offset_minutes)
        }
    }

    /// Current instant (UTC).
    pub fn now(&self) -> DateTime<Utc> {
        self.frozen.unwrap_or_else(Utc::now)
    }

    /// Month key ("YYYY-MM") for the current instant.
    pub fn month_key(&self) -> String {
        self.month_key_of(self.now())
    }

    /// Day key ("YYYY-MM-DD") for the current instant.
    pub fn day_key(&self) -> String {
        self.day_key_of(self.now())
    }

    /// Month key for an arbitrary instant, in the competition zone.
    pub fn month_key_of(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y-%m").to_string()
    }

    /// Day key for an arbitrary instant, in the competition zone.
    pub fn day_key_of(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.offset).format("%Y-%m-%d").to_string()
    }
}

/// Month key immediately before `month_key`, or `None` if the key is malformed.
pub fn previous_month_key(month_key: &str) -> Option<String> {
    let (year, month) = month_key.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    let (prev_year, prev_month) = if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    };
    Some(format!("{prev_year:04}-{prev_month:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_keys_use_competition_zone() {
        // 23:30 UTC on Jan 31 is already Feb 1 at UTC+2.
        let at = Utc.with_ymd_and_hms(2025, 1, 31, 23, 30, 0).unwrap();
        let clock = Clock::fixed(at, 120);

        assert_eq!(clock.month_key(), "2025-02");
        assert_eq!(clock.day_key(), "2025-02-01");

        let utc_clock = Clock::fixed(at, 0);
        assert_eq!(utc_clock.month_key(), "2025-01");
        assert_eq!(utc_clock.day_key(), "2025-01-31");
    }

    #[test]
    fn test_negative_offset() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 1, 0, 0).unwrap();
        let clock = Clock::fixed(at, -300);
        assert_eq!(clock.day_key(), "2025-02-28");
    }

    #[test]
    fn test_previous_month_key() {
        assert_eq!(previous_month_key("2025-03").as_deref(), Some("2025-02"));
        assert_eq!(previous_month_key("2025-01").as_deref(), Some("2024-12"));
        assert_eq!(previous_month_key("2025-13"), None);
        assert_eq!(previous_month_key("garbage"), None);
    }
}
