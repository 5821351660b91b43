use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use super::engine::{AttendanceEngine, Justification, JustificationKind, MIN_JUSTIFICATION_CHARS};
use crate::error::AppError;
use crate::model::{
    attendance::AttendanceRecord,
    justification::{
        AbsenceReason, JustificationRequest, MIN_REJECTION_CHARS, NewJustificationRequest,
        RequestStatus, Review,
    },
};
use crate::store::{EmployeeDirectory, JustificationStore, Stores};
use crate::utils::day_bounds::Clock;

const DEFAULT_REVIEWER: &str = "Administrator";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Approval {
    pub request: JustificationRequest,
    pub attendance: AttendanceRecord,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DayVerification {
    pub exists: bool,
    pub request: Option<JustificationRequest>,
}

/// Queue of absence justifications awaiting review. Approval rewrites the
/// day's attendance through the engine.
pub struct JustificationDesk {
    requests: Arc<dyn JustificationStore>,
    employees: Arc<dyn EmployeeDirectory>,
    engine: Arc<AttendanceEngine>,
    clock: Arc<dyn Clock>,
}

impl JustificationDesk {
    pub fn new(stores: &Stores, engine: Arc<AttendanceEngine>, clock: Arc<dyn Clock>) -> Self {
        Self {
            requests: stores.justifications.clone(),
            employees: stores.employees.clone(),
            engine,
            clock,
        }
    }

    pub async fn create(
        &self,
        employee_id: u64,
        absence_date: NaiveDate,
        reason: AbsenceReason,
        description: &str,
    ) -> Result<JustificationRequest, AppError> {
        if self.employees.find_by_id(employee_id).await?.is_none() {
            return Err(AppError::not_found(format!("Employee {employee_id} not found")));
        }
        let description = description.trim();
        if description.chars().count() < MIN_JUSTIFICATION_CHARS {
            return Err(AppError::invalid(format!(
                "Description must have at least {MIN_JUSTIFICATION_CHARS} characters"
            )));
        }

        let same_day = self.requests.find_for_day(employee_id, absence_date).await?;
        for existing in &same_day {
            match existing.status() {
                Some(RequestStatus::Approved) => {
                    return Err(AppError::invalid(format!(
                        "An approved justification already exists for {absence_date}"
                    )));
                }
                Some(RequestStatus::Pending) => {
                    return Err(AppError::invalid(format!(
                        "A pending justification already exists for {absence_date}"
                    )));
                }
                _ => {}
            }
        }

        let created = self
            .requests
            .create(&NewJustificationRequest {
                employee_id,
                absence_date,
                reason,
                description: description.to_string(),
                created_at: self.clock.now(),
            })
            .await?;
        tracing::info!(request_id = created.id, employee_id, date = %absence_date, %reason, "Justification requested");
        Ok(created)
    }

    pub async fn find(&self, id: u64) -> Result<JustificationRequest, AppError> {
        self.requests
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Justification request {id} not found")))
    }

    pub async fn list_by_employee(&self, employee_id: u64) -> Result<Vec<JustificationRequest>, AppError> {
        Ok(self.requests.list_by_employee(employee_id).await?)
    }

    pub async fn list_pending(&self) -> Result<Vec<JustificationRequest>, AppError> {
        Ok(self.requests.list_by_status(RequestStatus::Pending).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<JustificationRequest>, AppError> {
        Ok(self.requests.list_all().await?)
    }

    async fn require_pending(&self, id: u64, action: &str) -> Result<JustificationRequest, AppError> {
        let request = self.find(id).await?;
        if !request.is_pending() {
            return Err(AppError::invalid(format!(
                "Only pending justifications can be {action}"
            )));
        }
        Ok(request)
    }

    async fn record_review(&self, id: u64, review: Review) -> Result<JustificationRequest, AppError> {
        if !self.requests.review(id, &review).await? {
            return Err(AppError::conflict(format!(
                "Justification request {id} was already reviewed"
            )));
        }
        self.find(id).await
    }

    /// Justifies the absence on the attendance table, then closes the request.
    /// A refusal from the engine leaves the request pending.
    pub async fn approve(&self, id: u64, reviewer: &str) -> Result<Approval, AppError> {
        let request = self.require_pending(id, "approved").await?;
        let reviewer = Some(reviewer.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_REVIEWER);

        let attendance = self
            .engine
            .justify_attendance(Justification {
                employee_id: request.employee_id,
                date: request.absence_date,
                kind: JustificationKind::Absence,
                text: request.attendance_text(),
                marked_by: Some(reviewer.to_string()),
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(request_id = id, error = %e, "Approved justification not applied");
            })?;

        let request = self
            .record_review(
                id,
                Review {
                    status: RequestStatus::Approved,
                    reviewed_by: reviewer.to_string(),
                    rejection_reason: None,
                    reviewed_at: self.clock.now(),
                },
            )
            .await?;
        tracing::info!(request_id = id, attendance_id = attendance.id, reviewer, "Justification approved");
        Ok(Approval { request, attendance })
    }

    pub async fn reject(&self, id: u64, reviewer: &str, reason: &str) -> Result<JustificationRequest, AppError> {
        self.require_pending(id, "rejected").await?;
        let reason = reason.trim();
        if reason.chars().count() < MIN_REJECTION_CHARS {
            return Err(AppError::invalid(format!(
                "Rejection reason must have at least {MIN_REJECTION_CHARS} characters"
            )));
        }
        let reviewer = Some(reviewer.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_REVIEWER);

        let request = self
            .record_review(
                id,
                Review {
                    status: RequestStatus::Rejected,
                    reviewed_by: reviewer.to_string(),
                    rejection_reason: Some(reason.to_string()),
                    reviewed_at: self.clock.now(),
                },
            )
            .await?;
        tracing::info!(request_id = id, reviewer, "Justification rejected");
        Ok(request)
    }

    /// Latest request filed for the employee's day, whatever its status.
    pub async fn verify(&self, employee_id: u64, day: NaiveDate) -> Result<DayVerification, AppError> {
        let request = self
            .requests
            .find_for_day(employee_id, day)
            .await?
            .into_iter()
            .next();
        Ok(DayVerification {
            exists: request.is_some(),
            request,
        })
    }
}

#[cfg(test)]
mod justification_desk_tests {
    use super::*;
    use crate::test_support::{Harness, date, utc};
    use rstest::{fixture, rstest};

    const DESCRIPTION: &str = "Fever, medical certificate attached";

    #[fixture]
    async fn staffed() -> Harness {
        let h = Harness::new();
        let schedule_id = h.schedule((8, 0), (17, 0), 15).await;
        h.employee(1, Some(schedule_id)).await;
        h.credential("gate-a").await;
        h
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_queue_a_pending_request(#[future] staffed: Harness) {
        let h = staffed.await;
        let created = h
            .justifications
            .create(1, date(2025, 3, 3), AbsenceReason::Illness, "  Fever, medical certificate attached  ")
            .await
            .unwrap();
        assert_eq!(created.status(), Some(RequestStatus::Pending));
        assert_eq!(created.description, DESCRIPTION);
        assert_eq!(created.reason, "illness");

        assert_eq!(h.justifications.list_by_employee(1).await.unwrap().len(), 1);
        assert_eq!(h.justifications.list_pending().await.unwrap()[0].id, created.id);
        assert_eq!(h.justifications.list_all().await.unwrap().len(), 1);
        // filing alone leaves the attendance table untouched
        assert!(h.all_records().await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_refuse_short_descriptions_and_unknown_employees(#[future] staffed: Harness) {
        let h = staffed.await;
        assert!(matches!(
            h.justifications
                .create(1, date(2025, 3, 3), AbsenceReason::Other, "  sick  ")
                .await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            h.justifications
                .create(99, date(2025, 3, 3), AbsenceReason::Other, DESCRIPTION)
                .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_allow_one_open_request_per_day(#[future] staffed: Harness) {
        let h = staffed.await;
        let first = h
            .justifications
            .create(1, date(2025, 3, 3), AbsenceReason::Illness, DESCRIPTION)
            .await
            .unwrap();
        assert!(matches!(
            h.justifications
                .create(1, date(2025, 3, 3), AbsenceReason::Permit, DESCRIPTION)
                .await,
            Err(AppError::InvalidRequest(message)) if message.contains("pending")
        ));

        h.justifications
            .reject(first.id, "Ana Torres", "No certificate")
            .await
            .unwrap();
        let second = h
            .justifications
            .create(1, date(2025, 3, 3), AbsenceReason::Permit, DESCRIPTION)
            .await
            .unwrap();

        h.justifications.approve(second.id, "Ana Torres").await.unwrap();
        assert!(matches!(
            h.justifications
                .create(1, date(2025, 3, 3), AbsenceReason::Other, DESCRIPTION)
                .await,
            Err(AppError::InvalidRequest(message)) if message.contains("approved")
        ));
        // other days stay open
        assert!(h
            .justifications
            .create(1, date(2025, 3, 2), AbsenceReason::Other, DESCRIPTION)
            .await
            .is_ok());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_justify_the_day_when_approved(#[future] staffed: Harness) {
        let h = staffed.await;
        h.clock.set(utc(2025, 3, 3, 18, 0, 0));
        let request = h
            .justifications
            .create(1, date(2025, 3, 3), AbsenceReason::Illness, DESCRIPTION)
            .await
            .unwrap();

        let approval = h.justifications.approve(request.id, "Ana Torres").await.unwrap();
        assert_eq!(approval.request.status(), Some(RequestStatus::Approved));
        assert_eq!(approval.request.reviewed_by.as_deref(), Some("Ana Torres"));
        assert_eq!(approval.request.reviewed_at, Some(utc(2025, 3, 3, 18, 0, 0)));

        let records = h.all_records().await;
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.id, approval.attendance.id);
        assert_eq!(record.entry_time, Some(utc(2025, 3, 3, 0, 0, 0)));
        assert_eq!(record.exit_time, None);
        assert_eq!(record.marked_by.as_deref(), Some("Ana Torres"));
        assert_eq!(
            record.justification.as_deref(),
            Some("[Absence] Illness: Fever, medical certificate attached")
        );
        assert!(h.justifications.list_pending().await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_leave_the_request_pending_when_the_day_was_scanned(#[future] staffed: Harness) {
        let h = staffed.await;
        h.clock.set(utc(2025, 3, 3, 8, 5, 0));
        h.engine.mark_entry(1, "gate-a").await.unwrap();
        let request = h
            .justifications
            .create(1, date(2025, 3, 3), AbsenceReason::Emergency, DESCRIPTION)
            .await
            .unwrap();

        assert!(matches!(
            h.justifications.approve(request.id, "Ana Torres").await,
            Err(AppError::Conflict(_))
        ));
        let stored = h.justifications.find(request.id).await.unwrap();
        assert!(stored.is_pending());
        assert_eq!(stored.reviewed_by, None);
        assert!(h.all_records().await[0].justification.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_review_a_request_only_once(#[future] staffed: Harness) {
        let h = staffed.await;
        let request = h
            .justifications
            .create(1, date(2025, 3, 3), AbsenceReason::Holiday, DESCRIPTION)
            .await
            .unwrap();

        assert!(matches!(
            h.justifications.reject(request.id, "Ana Torres", "no").await,
            Err(AppError::InvalidRequest(_))
        ));
        let rejected = h
            .justifications
            .reject(request.id, " ", "  Not a holiday  ")
            .await
            .unwrap();
        assert_eq!(rejected.status(), Some(RequestStatus::Rejected));
        assert_eq!(rejected.reviewed_by.as_deref(), Some(DEFAULT_REVIEWER));
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Not a holiday"));

        assert!(matches!(
            h.justifications.approve(request.id, "Ana Torres").await,
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            h.justifications.approve(404, "Ana Torres").await,
            Err(AppError::NotFound(_))
        ));
        assert!(h.all_records().await.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn it_should_report_the_latest_request_of_a_day(#[future] staffed: Harness) {
        let h = staffed.await;
        assert!(!h.justifications.verify(1, date(2025, 3, 3)).await.unwrap().exists);

        let first = h
            .justifications
            .create(1, date(2025, 3, 3), AbsenceReason::Illness, DESCRIPTION)
            .await
            .unwrap();
        h.justifications
            .reject(first.id, "Ana Torres", "Missing certificate")
            .await
            .unwrap();
        h.clock.set(utc(2025, 3, 3, 9, 0, 0));
        let second = h
            .justifications
            .create(1, date(2025, 3, 3), AbsenceReason::Illness, DESCRIPTION)
            .await
            .unwrap();

        let verification = h.justifications.verify(1, date(2025, 3, 3)).await.unwrap();
        assert!(verification.exists);
        assert_eq!(verification.request.map(|r| r.id), Some(second.id));
        assert!(!h.justifications.verify(1, date(2025, 3, 4)).await.unwrap().exists);
    }
}
