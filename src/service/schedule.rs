use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::model::{
    employee::Employee,
    schedule::{CreateSchedule, ScheduleDefinition},
};
use crate::store::ScheduleStore;
use crate::utils::day_bounds::DayCalendar;

/// Late iff the entry is strictly more than `entry_tolerance` minutes past the
/// schedule's entry time on the entry's local day.
pub fn entry_is_late(
    schedule: &ScheduleDefinition,
    entry: DateTime<Utc>,
    calendar: &DayCalendar,
) -> bool {
    let expected = calendar.anchor(calendar.day_of(entry), schedule.entry_time);
    let minutes = (entry - expected).num_milliseconds() as f64 / 60_000.0;
    minutes > schedule.entry_tolerance as f64
}

#[derive(Clone)]
pub struct ScheduleResolver {
    schedules: Arc<dyn ScheduleStore>,
    calendar: DayCalendar,
}

impl ScheduleResolver {
    pub fn new(schedules: Arc<dyn ScheduleStore>, calendar: DayCalendar) -> Self {
        Self {
            schedules,
            calendar,
        }
    }

    pub async fn is_late(&self, employee: &Employee, entry: DateTime<Utc>) -> bool {
        let Some(schedule_id) = employee.schedule_id else {
            return false;
        };
        match self.schedules.find_by_id(schedule_id).await {
            Ok(Some(schedule)) => entry_is_late(&schedule, entry, &self.calendar),
            Ok(None) => {
                tracing::warn!(employee_id = employee.id, schedule_id, "Assigned schedule not found");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, employee_id = employee.id, schedule_id, "Schedule lookup failed");
                false
            }
        }
    }

    pub async fn create_schedule(
        &self,
        request: &CreateSchedule,
    ) -> Result<ScheduleDefinition, AppError> {
        let schedule = request.validate()?;
        let created = self.schedules.create(&schedule).await?;
        tracing::info!(schedule_id = created.id, "Schedule created");
        Ok(created)
    }
}

#[cfg(test)]
mod schedule_resolver_tests {
    use super::*;
    use crate::test_support::{Harness, utc};
    use chrono::NaiveTime;
    use rstest::rstest;

    fn eight_oclock(tolerance: i32) -> ScheduleDefinition {
        ScheduleDefinition {
            id: 1,
            entry_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            exit_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            entry_tolerance: tolerance,
        }
    }

    #[rstest]
    #[case(utc(2025, 3, 3, 8, 29, 59), false)]
    #[case(utc(2025, 3, 3, 8, 30, 0), false)]
    #[case(utc(2025, 3, 3, 8, 30, 1), true)]
    #[case(utc(2025, 3, 3, 7, 45, 0), false)]
    fn it_should_apply_the_tolerance_strictly(#[case] entry: DateTime<Utc>, #[case] late: bool) {
        assert_eq!(entry_is_late(&eight_oclock(30), entry, &DayCalendar::utc()), late);
    }

    #[test]
    fn it_should_anchor_to_the_local_day() {
        let lima = DayCalendar::from_offset_minutes(-300).unwrap();
        // 08:20 in Lima
        assert!(entry_is_late(&eight_oclock(15), utc(2025, 3, 3, 13, 20, 0), &lima));
        assert!(!entry_is_late(&eight_oclock(15), utc(2025, 3, 3, 13, 10, 0), &lima));
    }

    #[tokio::test]
    async fn it_should_never_flag_employees_without_a_schedule() {
        let h = Harness::new();
        let unscheduled = h.employee(1, None).await;
        let dangling = h.employee(2, Some(999)).await;
        let late = utc(2025, 3, 3, 11, 0, 0);
        assert!(!h.schedules.is_late(&unscheduled, late).await);
        assert!(!h.schedules.is_late(&dangling, late).await);
    }

    #[tokio::test]
    async fn it_should_resolve_the_assigned_schedule() {
        let h = Harness::new();
        let schedule_id = h.schedule((8, 0), (17, 0), 30).await;
        let employee = h.employee(1, Some(schedule_id)).await;
        assert!(h.schedules.is_late(&employee, utc(2025, 3, 3, 8, 31, 0)).await);
        assert!(!h.schedules.is_late(&employee, utc(2025, 3, 3, 8, 30, 0)).await);
    }

    #[tokio::test]
    async fn it_should_store_validated_schedules() {
        let h = Harness::new();
        let created = h
            .schedules
            .create_schedule(&CreateSchedule {
                entry_time: "07:30".into(),
                exit_time: "16:00".into(),
                entry_tolerance: None,
            })
            .await
            .unwrap();
        assert_eq!(created.entry_tolerance, 30);

        let rejected = h
            .schedules
            .create_schedule(&CreateSchedule {
                entry_time: "16:00".into(),
                exit_time: "07:30".into(),
                entry_tolerance: Some(10),
            })
            .await;
        assert!(matches!(rejected, Err(AppError::InvalidRequest(_))));
    }
}
