use chrono::{Datelike, NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValentineStatus {
    Before,
    Today,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLeft {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

fn valentine(year: i32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, 2, 14)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Where `now` (local wall-clock time) falls relative to this year's Feb 14.
pub fn valentine_status(now: NaiveDateTime) -> ValentineStatus {
    if now.date() == valentine(now.year()).date() {
        ValentineStatus::Today
    } else if now < valentine(now.year()) {
        ValentineStatus::Before
    } else {
        ValentineStatus::After
    }
}

/// Time until the next Feb 14 midnight; on the day itself that is next year's.
pub fn time_until_valentine(now: NaiveDateTime) -> TimeLeft {
    let mut target = valentine(now.year());
    if now >= target {
        target = valentine(now.year() + 1);
    }
    let total = (target - now).num_seconds();
    TimeLeft {
        days: total / 86_400,
        hours: total / 3_600 % 24,
        minutes: total / 60 % 60,
        seconds: total % 60,
    }
}

/// Whole days since the anniversary; negative when it lies ahead.
pub fn days_together(anniversary: NaiveDate, today: NaiveDate) -> i64 {
    (today - anniversary).num_days()
}
