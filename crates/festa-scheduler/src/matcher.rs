//! Pure birthday matching: no clock, no IO.
//!
//! Comparisons happen at minute granularity: "now" is rendered as
//! "HH:MM" and each stored notification time is normalized the same
//! way, so a record saved with second precision still fires.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use festa_core::types::{BirthdayRecord, MAX_NOTIFICATION_TIMES, normalize_time};

/// Does a reminder for `record` fire at this exact minute?
///
/// Month and day must match (the birth year is ignored; Feb 29 records
/// only fire in leap years), notifications must be enabled on the
/// record, and the current "HH:MM" must equal one of the stored times.
pub fn is_due(record: &BirthdayRecord, now: NaiveDateTime) -> bool {
    if !record.notification_enabled {
        return false;
    }
    let today = now.date();
    if (today.month(), today.day()) != (record.birth_date.month(), record.birth_date.day()) {
        return false;
    }
    let minute = now.format("%H:%M").to_string();
    record
        .notification_times
        .iter()
        .take(MAX_NOTIFICATION_TIMES)
        .any(|t| normalize_time(t).is_ok_and(|t| t == minute))
}

/// Key identifying one processed minute ("YYYY-MM-DD HH:MM"). The
/// local driver skips a tick whose key it has already handled.
pub fn dedup_key(now: NaiveDateTime) -> String {
    now.format("%Y-%m-%d %H:%M").to_string()
}

/// Age someone turns on a birthday occurring in `on`'s year.
pub fn age_turning(birth: NaiveDate, on: NaiveDate) -> i32 {
    on.year() - birth.year()
}

/// Next calendar occurrence of `birth` on or after `today`.
/// Feb 29 birthdays observe on Mar 1 in non-leap years.
pub fn next_occurrence(birth: NaiveDate, today: NaiveDate) -> NaiveDate {
    let occurrence_in = |year: i32| {
        NaiveDate::from_ymd_opt(year, birth.month(), birth.day())
            .or_else(|| NaiveDate::from_ymd_opt(year, 3, 1))
            .unwrap_or(birth)
    };
    let this_year = occurrence_in(today.year());
    if this_year >= today {
        this_year
    } else {
        occurrence_in(today.year() + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(month: u32, day: u32, times: &[&str]) -> BirthdayRecord {
        // 1995 is not a leap year; a Feb 29 fixture needs one.
        let birth = NaiveDate::from_ymd_opt(1995, month, day)
            .or_else(|| NaiveDate::from_ymd_opt(1996, month, day))
            .unwrap();
        let mut rec = BirthdayRecord::new("u1", "Anna", "Schmidt", birth);
        rec.notification_times = times.iter().map(|t| t.to_string()).collect();
        rec
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_due_on_exact_match() {
        let rec = record(6, 15, &["09:00", "18:00"]);
        assert!(is_due(&rec, at(2025, 6, 15, 9, 0)));
        assert!(is_due(&rec, at(2025, 6, 15, 18, 0)));
    }

    #[test]
    fn test_not_due_one_minute_off() {
        let rec = record(6, 15, &["09:00", "18:00"]);
        assert!(!is_due(&rec, at(2025, 6, 15, 9, 1)));
        assert!(!is_due(&rec, at(2025, 6, 15, 8, 59)));
    }

    #[test]
    fn test_not_due_on_wrong_date() {
        let rec = record(6, 15, &["09:00"]);
        assert!(!is_due(&rec, at(2025, 6, 16, 9, 0)));
        assert!(!is_due(&rec, at(2025, 7, 15, 9, 0)));
    }

    #[test]
    fn test_birth_year_is_ignored() {
        // Born 1995, firing in 2031
        let rec = record(6, 15, &["09:00"]);
        assert!(is_due(&rec, at(2031, 6, 15, 9, 0)));
    }

    #[test]
    fn test_disabled_record_never_due() {
        let mut rec = record(6, 15, &["09:00"]);
        rec.notification_enabled = false;
        assert!(!is_due(&rec, at(2025, 6, 15, 9, 0)));
    }

    #[test]
    fn test_times_with_seconds_still_match() {
        // Stored entries may predate minute normalization
        let rec = record(6, 15, &["09:00:00"]);
        assert!(is_due(&rec, at(2025, 6, 15, 9, 0)));
    }

    #[test]
    fn test_unparseable_time_entry_is_ignored() {
        let rec = record(6, 15, &["garbage", "09:00"]);
        assert!(is_due(&rec, at(2025, 6, 15, 9, 0)));
        assert!(!is_due(&rec, at(2025, 6, 15, 10, 0)));
    }

    #[test]
    fn test_entries_past_the_cap_never_fire() {
        let rec = record(
            6,
            15,
            &["01:00", "02:00", "03:00", "04:00", "05:00", "06:00"],
        );
        assert!(is_due(&rec, at(2025, 6, 15, 5, 0)));
        // Sixth entry is beyond the cap
        assert!(!is_due(&rec, at(2025, 6, 15, 6, 0)));
    }

    #[test]
    fn test_feb29_fires_only_in_leap_years() {
        let rec = record(2, 29, &["09:00"]);
        assert!(is_due(&rec, at(2024, 2, 29, 9, 0)));
        // 2025-02-29 does not exist; Mar 1 is not a match either
        assert!(!is_due(&rec, at(2025, 3, 1, 9, 0)));
    }

    #[test]
    fn test_dedup_key_is_minute_precise() {
        assert_eq!(dedup_key(at(2025, 6, 15, 9, 0)), "2025-06-15 09:00");
        assert_eq!(dedup_key(at(2025, 6, 15, 9, 1)), "2025-06-15 09:01");
        // Seconds never leak into the key
        let with_secs = NaiveDate::from_ymd_opt(2025, 6, 15)
            .unwrap()
            .and_hms_opt(9, 0, 42)
            .unwrap();
        assert_eq!(dedup_key(with_secs), "2025-06-15 09:00");
    }

    #[test]
    fn test_age_turning() {
        let birth = NaiveDate::from_ymd_opt(1995, 6, 15).unwrap();
        assert_eq!(age_turning(birth, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()), 30);
        assert_eq!(age_turning(birth, NaiveDate::from_ymd_opt(1996, 6, 15).unwrap()), 1);
    }

    #[test]
    fn test_next_occurrence_same_year() {
        let birth = NaiveDate::from_ymd_opt(1995, 6, 15).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(
            next_occurrence(birth, today),
            NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
        );
    }

    #[test]
    fn test_next_occurrence_rolls_to_next_year() {
        let birth = NaiveDate::from_ymd_opt(1995, 6, 15).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();
        assert_eq!(
            next_occurrence(birth, today),
            NaiveDate::from_ymd_opt(2026, 6, 15).unwrap()
        );
        // The birthday itself counts as the next occurrence
        let on_the_day = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(
            next_occurrence(birth, on_the_day),
            on_the_day
        );
    }

    #[test]
    fn test_next_occurrence_feb29_fallback() {
        let birth = NaiveDate::from_ymd_opt(1996, 2, 29).unwrap();
        // Leap year: the real date
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(
            next_occurrence(birth, today),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        // Non-leap year: observed Mar 1
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(
            next_occurrence(birth, today),
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
        );
    }
}
