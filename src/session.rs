//! Trading session clock
//!
//! A-shares trade in two windows a day, 09:30-11:30 and 13:00-15:00 local
//! time. The market engine gates matchmaking on this and the scheduler
//! fires the close event when the afternoon window ends.

use chrono::{DateTime, FixedOffset, NaiveTime, Offset, Utc};
use once_cell::sync::Lazy;

const SECS_PER_HOUR: i32 = 3_600;

/// The two daily trading windows, local to the session timezone.
pub static TRADING_PERIOD: Lazy<[(NaiveTime, NaiveTime); 2]> = Lazy::new(|| {
    [
        (time(9, 30), time(11, 30)),
        (time(13, 0), time(15, 0)),
    ]
});

fn time(hour: u32, min: u32) -> NaiveTime {
    // Constants above are all valid wall-clock times.
    NaiveTime::from_hms_opt(hour, min, 0).unwrap_or(NaiveTime::MIN)
}

/// Session schedule pinned to one UTC offset.
#[derive(Debug, Clone)]
pub struct TradingSession {
    offset: FixedOffset,
    periods: [(NaiveTime, NaiveTime); 2],
}

impl TradingSession {
    /// A-share schedule at the given UTC offset (+8 in production).
    pub fn china_a(utc_offset_hours: i32) -> Self {
        // An out-of-range offset falls back to UTC rather than aborting.
        let offset =
            FixedOffset::east_opt(utc_offset_hours * SECS_PER_HOUR).unwrap_or_else(|| Utc.fix());
        Self {
            offset,
            periods: *TRADING_PERIOD,
        }
    }

    /// Whether the market is open right now.
    pub fn is_trading_time(&self) -> bool {
        self.is_trading_at(Utc::now())
    }

    /// Whether the market is open at `instant`.
    pub fn is_trading_at(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.offset).time();
        self.periods
            .iter()
            .any(|(start, end)| (*start..=*end).contains(&local))
    }

    /// Local time the final window closes (15:00).
    pub fn close_time(&self) -> NaiveTime {
        self.periods[1].1
    }

    /// Whether `instant` falls at or after the final close of its day.
    pub fn is_after_close(&self, instant: DateTime<Utc>) -> bool {
        instant.with_timezone(&self.offset).time() >= self.close_time()
    }

    /// Today's date on the session clock.
    pub fn today(&self) -> chrono::NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}
