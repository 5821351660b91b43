use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::model::{
    attendance::AttendanceRecord,
    credential::{Credential, NewCredential},
    employee::Employee,
    schedule::NewSchedule,
};
use crate::service::{
    credentials::CredentialIssuer,
    duplicates::DuplicateCollapser,
    engine::AttendanceEngine,
    events::{Audience, EventFanout, NotificationSink, RealtimePublisher},
    justifications::JustificationDesk,
    reports::ReportMaterializer,
    retention::RetentionSweeper,
    schedule::ScheduleResolver,
    sheets::SheetGenerator,
};
use crate::store::{
    AttendanceRepository, CredentialStore, ScheduleStore, Stores, memory::InMemoryStore,
};
use crate::utils::day_bounds::{Clock, DayCalendar};

pub fn utc(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, mi, s).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.0.lock().unwrap() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
pub struct RecordingPublisher(Mutex<Vec<String>>);

impl RecordingPublisher {
    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl RealtimePublisher for RecordingPublisher {
    fn publish(&self, event: &str, _payload: serde_json::Value) {
        self.0.lock().unwrap().push(event.to_string());
    }
}

#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<String>>);

impl RecordingSink {
    pub fn titles(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, _audience: Audience, title: &str, _body: &str) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(title.to_string());
        Ok(())
    }
}

/// Every service wired to one in-memory store, a fixed clock and recording signals.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub stores: Stores,
    pub clock: Arc<FixedClock>,
    pub calendar: DayCalendar,
    pub publisher: Arc<RecordingPublisher>,
    pub sink: Arc<RecordingSink>,
    pub reports: Arc<ReportMaterializer>,
    pub engine: Arc<AttendanceEngine>,
    pub justifications: JustificationDesk,
    pub sheets: SheetGenerator,
    pub duplicates: DuplicateCollapser,
    pub sweeper: RetentionSweeper,
    pub issuer: CredentialIssuer,
    pub schedules: ScheduleResolver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_calendar(DayCalendar::utc(), utc(2025, 3, 3, 7, 0, 0))
    }

    pub fn with_calendar(calendar: DayCalendar, now: DateTime<Utc>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let stores = Stores::memory(store.clone());
        let clock = Arc::new(FixedClock::new(now));
        let publisher = Arc::new(RecordingPublisher::default());
        let sink = Arc::new(RecordingSink::default());
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let reports = Arc::new(ReportMaterializer::new(&stores, calendar, dyn_clock.clone()));
        let events = EventFanout::new(sink.clone(), publisher.clone(), calendar);
        let engine = Arc::new(AttendanceEngine::new(
            &stores,
            reports.clone(),
            events,
            calendar,
            dyn_clock.clone(),
        ));

        Self {
            sheets: SheetGenerator::new(&stores, calendar, dyn_clock.clone()),
            duplicates: DuplicateCollapser::new(&stores, calendar),
            sweeper: RetentionSweeper::new(&stores, calendar, dyn_clock.clone()),
            justifications: JustificationDesk::new(&stores, engine.clone(), dyn_clock.clone()),
            issuer: CredentialIssuer::new(&stores, dyn_clock),
            schedules: ScheduleResolver::new(stores.schedules.clone(), calendar),
            store,
            stores,
            clock,
            calendar,
            publisher,
            sink,
            reports,
            engine,
        }
    }

    pub async fn schedule(&self, entry: (u32, u32), exit: (u32, u32), tolerance: i32) -> u64 {
        ScheduleStore::create(
            self.store.as_ref(),
            &NewSchedule {
                entry_time: NaiveTime::from_hms_opt(entry.0, entry.1, 0).unwrap(),
                exit_time: NaiveTime::from_hms_opt(exit.0, exit.1, 0).unwrap(),
                entry_tolerance: tolerance,
            },
        )
        .await
        .unwrap()
        .id
    }

    pub async fn employee(&self, id: u64, schedule_id: Option<u64>) -> Employee {
        let employee = Employee {
            id,
            first_name: "Lucia".into(),
            last_name: format!("Paredes {id}"),
            dni: Some(format!("4587{id:04}")),
            schedule_id,
        };
        self.store.put_employee(employee.clone()).await;
        employee
    }

    pub async fn credential(&self, token: &str) -> Credential {
        CredentialStore::create(
            self.store.as_ref(),
            &NewCredential {
                token: token.into(),
                created_at: self.clock.now(),
                expires_at: None,
            },
        )
        .await
        .unwrap()
    }

    /// Inserts a raw row, bypassing the engine.
    pub async fn seed(&self, record: AttendanceRecord) -> AttendanceRecord {
        AttendanceRepository::insert(self.store.as_ref(), &record)
            .await
            .unwrap()
    }

    pub async fn all_records(&self) -> Vec<AttendanceRecord> {
        AttendanceRepository::list_all(self.store.as_ref()).await.unwrap()
    }
}
