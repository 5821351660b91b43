use crate::api::attendance::{
    CheckKind, JustifyRequest, ManualMarkRequest, MonthlySheetsRequest, RangeRequest, ScanEntry,
    ScanExit,
};
use crate::api::credential::CreateCredential;
use crate::api::justification::{CreateJustification, RejectJustification};
use crate::api::report::DateRangeRequest;
use crate::model::{
    attendance::AttendanceRecord,
    credential::Credential,
    employee::Employee,
    justification::{AbsenceReason, JustificationRequest, RequestStatus},
    report::AttendanceReport,
    schedule::{CreateSchedule, ScheduleDefinition},
};
use crate::service::{
    duplicates::CollapseRun,
    engine::{EmployeeMonthStats, JustificationKind, ManualDirection, MonthlyStats, UnjustifiedDay},
    justifications::{Approval, DayVerification},
    reports::{FixRun, ReportStats, SyncRun, SyncStatus},
    retention::CleanupRun,
    sheets::SheetRun,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

pub struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Reconciliation API",
        version = "1.0.0",
        description = r#"
## Attendance Reconciliation

Keeps one attendance record per employee and local calendar day, fed by three channels:

- **QR scans** at the gates (`/attendance/entry`, `/attendance/exit`)
- **Manual marks** by HR or admins
- **Generated monthly sheets** that pre-fill every business day with a placeholder

Later inputs upgrade the placeholder instead of adding rows. Reports are derived
per day from the attendance table and repaired on read.

### 🔐 Security
Every endpoint expects a **JWT Bearer** access token. Scans are limited to the
caller's own employee record unless the caller is **HR** or **Admin**.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::attendance::mark_entry,
        crate::api::attendance::mark_exit,
        crate::api::attendance::mark_manual,
        crate::api::attendance::create_monthly_sheets,
        crate::api::attendance::remove_duplicates,
        crate::api::attendance::justify,
        crate::api::attendance::unjustified_days,
        crate::api::attendance::check_attendance,
        crate::api::attendance::month_records,
        crate::api::attendance::range_records,
        crate::api::attendance::monthly_stats,
        crate::api::attendance::cleanup,

        crate::api::report::by_year_month,
        crate::api::report::by_year,
        crate::api::report::by_date_range,
        crate::api::report::by_employee,
        crate::api::report::stats,
        crate::api::report::sync_all,
        crate::api::report::sync_status,
        crate::api::report::fix_months,

        crate::api::credential::create_credential,
        crate::api::credential::list_credentials,
        crate::api::credential::deactivate_credential,

        crate::api::justification::create_justification,
        crate::api::justification::list_justifications,
        crate::api::justification::pending_justifications,
        crate::api::justification::employee_justifications,
        crate::api::justification::get_justification,
        crate::api::justification::approve_justification,
        crate::api::justification::reject_justification,
        crate::api::justification::verify_justification,

        crate::api::schedule::create_schedule
    ),
    components(
        schemas(
            ScanEntry,
            ScanExit,
            ManualMarkRequest,
            ManualDirection,
            MonthlySheetsRequest,
            JustifyRequest,
            JustificationKind,
            RangeRequest,
            CheckKind,
            DateRangeRequest,
            CreateCredential,
            CreateSchedule,
            AttendanceRecord,
            AttendanceReport,
            Credential,
            Employee,
            ScheduleDefinition,
            SheetRun,
            CollapseRun,
            CleanupRun,
            UnjustifiedDay,
            EmployeeMonthStats,
            MonthlyStats,
            ReportStats,
            SyncRun,
            SyncStatus,
            FixRun,
            CreateJustification,
            RejectJustification,
            AbsenceReason,
            RequestStatus,
            JustificationRequest,
            Approval,
            DayVerification
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Attendance", description = "Scans, manual marks, sheets and justifications"),
        (name = "Reports", description = "Per-day attendance reports"),
        (name = "Justifications", description = "Absence justification requests and their review"),
        (name = "QR", description = "Gate QR credentials"),
        (name = "Schedule", description = "Work schedules"),
    )
)]
pub struct ApiDoc;
