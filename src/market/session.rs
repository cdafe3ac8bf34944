use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use log::warn;

use crate::error::{Error, Result};

pub const EXCHANGE_TZ: Tz = chrono_tz::America::New_York;

// Longest run of non-trading days we expect (long weekend plus a holiday streak)
const MAX_SESSION_LOOKBACK_DAYS: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CloseWindow {
    pub fn starting_at(start: DateTime<Utc>, minutes: i64) -> Self {
        Self {
            start,
            end: start + Duration::minutes(minutes),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl MarketCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn parse(list: &str) -> Self {
        let holidays = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!("Ignoring invalid holiday date '{}': {}", s, e);
                    None
                }
            });
        Self::new(holidays)
    }

    pub fn holiday_count(&self) -> usize {
        self.holidays.len()
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    pub fn last_session_on_or_before(&self, date: NaiveDate) -> Result<NaiveDate> {
        let mut day = date;
        for _ in 0..=MAX_SESSION_LOOKBACK_DAYS {
            if self.is_trading_day(day) {
                return Ok(day);
            }
            day = day.pred_opt().ok_or(Error::NoSession(date))?;
        }
        Err(Error::NoSession(date))
    }
}

pub fn market_close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default()
}

fn local_to_utc(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn stock_close_window(now: DateTime<Utc>, calendar: &MarketCalendar) -> Result<CloseWindow> {
    let local = now.with_timezone(&EXCHANGE_TZ);
    let today = local.date_naive();

    // Today's session only counts once the bell has rung
    let candidate = if calendar.is_trading_day(today) && local.time() >= market_close_time() {
        today
    } else {
        today.pred_opt().ok_or(Error::NoSession(today))?
    };
    let session = calendar.last_session_on_or_before(candidate)?;

    let last_bar = market_close_time() - Duration::minutes(1);
    let start = local_to_utc(&EXCHANGE_TZ, session, last_bar).ok_or(Error::NoSession(session))?;
    Ok(CloseWindow::starting_at(start, 1))
}

pub fn crypto_close_window(now: DateTime<Utc>) -> CloseWindow {
    let midnight = now
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc();
    CloseWindow::starting_at(midnight, 1)
}

// Next instant strictly after `now` where the wall clock in `tz` reads `at`
pub fn next_fire(now: DateTime<Utc>, tz: &Tz, at: NaiveTime) -> DateTime<Utc> {
    let mut date = now.with_timezone(tz).date_naive();
    loop {
        if let Some(fire) = local_to_utc(tz, date, at) {
            if fire > now {
                return fire;
            }
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => return now + Duration::days(1),
        };
    }
}
