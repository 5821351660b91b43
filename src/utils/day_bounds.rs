use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset,
    TimeZone, Timelike, Utc, Weekday,
};

/// Seconds after local midnight in which a system entry still reads as a day-start placeholder.
pub const DAY_START_SLACK_SECS: u32 = 5;

/// First and last instant (millisecond precision) of a local calendar day, expressed in UTC.
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_start = date.and_time(NaiveTime::MIN);
    let utc_start = local_start - Duration::seconds(offset.local_minus_utc() as i64);
    let start = Utc.from_utc_datetime(&utc_start);
    let end = start + Duration::days(1) - Duration::milliseconds(1);
    (start, end)
}

/// Business-timezone view of instants. Every "which day is this" question goes through here.
#[derive(Debug, Clone, Copy)]
pub struct DayCalendar {
    offset: FixedOffset,
}

impl DayCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Builds a calendar from an offset in minutes east of UTC.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    pub fn day_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date()
    }

    pub fn bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        day_bounds(date, self.offset)
    }

    pub fn start_of(&self, date: NaiveDate) -> DateTime<Utc> {
        self.bounds(date).0
    }

    pub fn end_of(&self, date: NaiveDate) -> DateTime<Utc> {
        self.bounds(date).1
    }

    /// The UTC instant at which `time` happens on local `date`.
    pub fn anchor(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        Utc.from_utc_datetime(&(local - Duration::seconds(self.offset.local_minus_utc() as i64)))
    }

    /// Local clock reads 00:00 (seconds ignored). Such timestamps carry no observed time.
    pub fn is_midnight(&self, instant: DateTime<Utc>) -> bool {
        let local = self.local(instant);
        local.hour() == 0 && local.minute() == 0
    }

    pub fn is_day_start(&self, instant: DateTime<Utc>) -> bool {
        let local = self.local(instant);
        local.hour() == 0 && local.minute() == 0 && local.second() < DAY_START_SLACK_SECS
    }
}

pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (first, last) = month_range(year, month)?;
    Some((last - first).num_days() as u32 + 1)
}

/// First and last date of a month, `None` for an invalid year/month pair.
pub fn month_range(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

/// Monday to Friday dates of a month, in order.
pub fn business_days(year: i32, month: u32) -> Vec<NaiveDate> {
    let Some((first, last)) = month_range(year, month) else {
        return Vec::new();
    };
    first
        .iter_days()
        .take_while(|d| *d <= last)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
