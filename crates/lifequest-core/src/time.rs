//! Calendar-day arithmetic in the reference time zone.
//!
//! Every "today" / "yesterday" decision in the crate goes through
//! [`ReferenceZone`] so that a habit marked at 23:30 local time lands on the
//! same day no matter where the process runs.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// Fixed IANA zone used for calendar comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceZone(Tz);

impl ReferenceZone {
    pub fn new(tz: Tz) -> Self {
        Self(tz)
    }

    pub fn tz(&self) -> Tz {
        self.0
    }

    /// Local calendar date of an instant.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.0).date_naive()
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.date_of(now)
    }

    pub fn yesterday(&self, now: DateTime<Utc>) -> NaiveDate {
        let today = self.today(now);
        today.checked_sub_days(Days::new(1)).unwrap_or(today)
    }

    pub fn is_today(&self, instant: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.date_of(instant) == self.today(now)
    }

    pub fn is_yesterday(&self, instant: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.date_of(instant) == self.yesterday(now)
    }
}

impl Default for ReferenceZone {
    fn default() -> Self {
        Self(chrono_tz::Asia::Kolkata)
    }
}

impl FromStr for ReferenceZone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<Tz>().map(Self).map_err(|e| e.to_string())
    }
}

/// Parse a persisted timestamp.
///
/// RFC 3339 values keep their offset; values without zone information are
/// taken as UTC.
pub fn parse_persisted_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
