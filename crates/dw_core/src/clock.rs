use parking_lot::Mutex;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::{codes, AppError};

/// Fixed-width UTC layout so stored text sorts in chronological order.
const STORED_TS: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z");

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to. Used to pin incident timestamps in tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: time::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

/// Drop precision the stored layout cannot represent so in-memory and persisted values agree.
pub fn to_stored_precision(dt: OffsetDateTime) -> OffsetDateTime {
    let utc = dt.to_offset(UtcOffset::UTC);
    utc.replace_nanosecond(utc.nanosecond() / 1_000 * 1_000)
        .unwrap_or(utc)
}

pub fn format_ts(dt: OffsetDateTime) -> Result<String, AppError> {
    dt.to_offset(UtcOffset::UTC).format(STORED_TS).map_err(|e| {
        AppError::new(codes::TIME_FORMAT_FAILED, "Failed to format timestamp")
            .with_details(format!("value={dt}; err={e}"))
    })
}

pub fn parse_ts(raw: &str) -> Result<OffsetDateTime, AppError> {
    PrimitiveDateTime::parse(raw, STORED_TS)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| {
            AppError::new(codes::DB_QUERY_FAILED, "Stored timestamp is malformed")
                .with_details(format!("value={raw}; err={e}"))
        })
}
