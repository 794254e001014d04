use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDateTime, Offset, TimeZone, Utc,
};

/// Zone in which "start of today" is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CutoffZone {
    /// The host's local zone.
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl fmt::Display for CutoffZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid cutoff zone '{0}': expected 'local', 'utc' or an offset like '+05:30'")]
pub struct ParseCutoffZoneError(String);

impl FromStr for CutoffZone {
    type Err = ParseCutoffZoneError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "utc" | "z" => Ok(Self::Fixed(Utc.fix())),
            _ => trimmed
                .parse::<FixedOffset>()
                .map(Self::Fixed)
                .map_err(|_| ParseCutoffZoneError(raw.to_string())),
        }
    }
}

impl CutoffZone {
    /// Start of the calendar day containing `now`, as seen from this zone.
    pub fn start_of_day(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Local => start_of_day_in(now, &Local),
            Self::Fixed(offset) => start_of_day_in(now, offset),
        }
    }
}

/// Local midnight of `now`'s date in `tz`, converted back to UTC.
///
/// An ambiguous midnight resolves to the earlier instant. A midnight that falls
/// into a DST gap resolves to the first representable instant of that day.
pub fn start_of_day_in<Tz: TimeZone>(now: DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
    let midnight: NaiveDateTime = now.with_timezone(tz).date_naive().and_hms_opt(0, 0, 0)?;

    // Gaps are at most a couple of hours; step forward 15 minutes at a time.
    for step in 0..=12 {
        let candidate = midnight + Duration::minutes(15 * step);
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Some(earliest.with_timezone(&Utc)),
            LocalResult::None => continue,
        }
    }
    None
}
