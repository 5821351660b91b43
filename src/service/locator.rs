//! Which record speaks for an (employee, day) pair.

use chrono::NaiveDate;

use crate::model::attendance::AttendanceRecord;
use crate::store::{AttendanceRepository, StoreError};
use crate::utils::day_bounds::DayCalendar;

/// How a record was matched to a day, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DayMatch {
    /// No timestamps, created that day.
    Undated,
    /// Entry or exit pinned to 00:00 of the day.
    Anchored,
    /// Entry or exit with an observed clock time.
    Observed,
    /// Generated sheet waiting for a scan.
    Placeholder,
}

/// Collapse ranking, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    SystemPlaceholder,
    Untimed,
    SystemTimed,
    Observed,
}

#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub record: &'a AttendanceRecord,
    pub kind: DayMatch,
}

/// Entry first, then exit, then creation time (only for rows with neither).
pub fn classify(record: &AttendanceRecord, day: NaiveDate, calendar: &DayCalendar) -> Option<DayMatch> {
    if let Some(entry) = record.entry_time.filter(|t| calendar.day_of(*t) == day) {
        return Some(if record.is_placeholder(calendar) {
            DayMatch::Placeholder
        } else if calendar.is_midnight(entry) {
            DayMatch::Anchored
        } else {
            DayMatch::Observed
        });
    }
    if let Some(exit) = record.exit_time.filter(|t| calendar.day_of(*t) == day) {
        return Some(if calendar.is_midnight(exit) {
            DayMatch::Anchored
        } else {
            DayMatch::Observed
        });
    }
    if record.entry_time.is_none()
        && record.exit_time.is_none()
        && calendar.day_of(record.created_at) == day
    {
        return Some(DayMatch::Undated);
    }
    None
}

/// Best match: strongest tier, then most recently created, then highest id.
pub fn locate<'a>(
    records: &'a [AttendanceRecord],
    day: NaiveDate,
    calendar: &DayCalendar,
) -> Option<Located<'a>> {
    records
        .iter()
        .filter_map(|record| classify(record, day, calendar).map(|kind| Located { record, kind }))
        .max_by_key(|l| (l.kind, l.record.created_at, l.record.id))
}

/// Fresh read of every record that belongs to `day`.
pub async fn day_records(
    attendances: &dyn AttendanceRepository,
    employee_id: u64,
    day: NaiveDate,
    calendar: &DayCalendar,
) -> Result<Vec<AttendanceRecord>, StoreError> {
    let (start, end) = calendar.bounds(day);
    let mut records = attendances
        .list_touching(start, end, Some(employee_id))
        .await?;
    records.retain(|r| classify(r, day, calendar).is_some());
    Ok(records)
}

pub fn precedence(record: &AttendanceRecord, calendar: &DayCalendar) -> Precedence {
    if record.has_real_time(calendar) {
        if record.is_system() {
            Precedence::SystemTimed
        } else {
            Precedence::Observed
        }
    } else if record.is_system() {
        Precedence::SystemPlaceholder
    } else {
        Precedence::Untimed
    }
}

/// The local day a record is filed under.
pub fn day_key(record: &AttendanceRecord, calendar: &DayCalendar) -> NaiveDate {
    calendar.day_of(record.anchor_instant())
}

#[cfg(test)]
mod locator_tests {
    use super::*;
    use crate::model::attendance::{SCAN_TAG, SYSTEM_TAG};
    use crate::test_support::{date, utc};
    use chrono::{DateTime, Utc};

    fn row(id: u64, tag: &str, entry: Option<DateTime<Utc>>, created: DateTime<Utc>) -> AttendanceRecord {
        let mut r = AttendanceRecord::draft(1, created);
        r.id = id;
        r.marked_by = Some(tag.into());
        r.entry_time = entry;
        r
    }

    #[test]
    fn it_should_prefer_placeholders_over_observed_rows() {
        let calendar = DayCalendar::utc();
        let records = vec![
            row(1, SCAN_TAG, Some(utc(2025, 3, 3, 8, 5, 0)), utc(2025, 3, 3, 8, 5, 0)),
            row(2, SYSTEM_TAG, Some(utc(2025, 3, 3, 0, 0, 0)), utc(2025, 3, 1, 10, 0, 0)),
        ];
        let located = locate(&records, date(2025, 3, 3), &calendar).unwrap();
        assert_eq!(located.kind, DayMatch::Placeholder);
        assert_eq!(located.record.id, 2);
    }

    #[test]
    fn it_should_classify_each_tier() {
        let calendar = DayCalendar::utc();
        let day = date(2025, 3, 3);
        let observed = row(1, "Ana", Some(utc(2025, 3, 3, 9, 0, 0)), utc(2025, 3, 3, 9, 0, 0));
        let anchored = row(2, "Ana", Some(utc(2025, 3, 3, 0, 0, 0)), utc(2025, 3, 4, 9, 0, 0));
        let undated = row(3, "Ana", None, utc(2025, 3, 3, 12, 0, 0));
        let elsewhere = row(4, "Ana", Some(utc(2025, 3, 2, 9, 0, 0)), utc(2025, 3, 3, 9, 0, 0));
        assert_eq!(classify(&observed, day, &calendar), Some(DayMatch::Observed));
        assert_eq!(classify(&anchored, day, &calendar), Some(DayMatch::Anchored));
        assert_eq!(classify(&undated, day, &calendar), Some(DayMatch::Undated));
        assert_eq!(classify(&elsewhere, day, &calendar), None);
    }

    #[test]
    fn it_should_match_by_exit_when_entry_is_missing() {
        let calendar = DayCalendar::utc();
        let mut exit_only = row(1, "Ana", None, utc(2025, 3, 2, 9, 0, 0));
        exit_only.exit_time = Some(utc(2025, 3, 3, 17, 0, 0));
        assert_eq!(classify(&exit_only, date(2025, 3, 3), &calendar), Some(DayMatch::Observed));
        assert_eq!(classify(&exit_only, date(2025, 3, 2), &calendar), None);
    }

    #[test]
    fn it_should_break_ties_by_most_recent_creation() {
        let calendar = DayCalendar::utc();
        let records = vec![
            row(7, "Ana", Some(utc(2025, 3, 3, 9, 0, 0)), utc(2025, 3, 3, 9, 0, 0)),
            row(5, "Ana", Some(utc(2025, 3, 3, 8, 0, 0)), utc(2025, 3, 3, 10, 0, 0)),
        ];
        assert_eq!(locate(&records, date(2025, 3, 3), &calendar).unwrap().record.id, 5);
    }

    #[test]
    fn it_should_rank_real_timestamps_then_human_origin() {
        let calendar = DayCalendar::utc();
        let created = utc(2025, 3, 1, 0, 0, 0);
        let placeholder = row(1, SYSTEM_TAG, Some(utc(2025, 3, 3, 0, 0, 0)), created);
        let untimed = row(2, "Ana", Some(utc(2025, 3, 3, 0, 0, 0)), created);
        let system_timed = row(3, SYSTEM_TAG, Some(utc(2025, 3, 3, 9, 0, 0)), created);
        let observed = row(4, SCAN_TAG, Some(utc(2025, 3, 3, 9, 0, 0)), created);
        assert_eq!(precedence(&placeholder, &calendar), Precedence::SystemPlaceholder);
        assert_eq!(precedence(&untimed, &calendar), Precedence::Untimed);
        assert_eq!(precedence(&system_timed, &calendar), Precedence::SystemTimed);
        assert_eq!(precedence(&observed, &calendar), Precedence::Observed);
        assert!(Precedence::SystemPlaceholder < Precedence::Untimed);
        assert!(Precedence::SystemTimed < Precedence::Observed);
    }
}
