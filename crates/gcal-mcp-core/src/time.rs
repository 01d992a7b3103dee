//! Time types and date/time argument parsing.
//!
//! Tool arguments arrive as free-form strings ("tomorrow 3pm",
//! "2025-02-05", "2025-02-05T10:00:00+01:00"). This module turns them into
//! [`EventTime`] values and [`TimeWindow`] query ranges. Natural-language
//! phrases are delegated to `chrono-english`.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// Default length of a timed event, in minutes, when no end is given.
pub const DEFAULT_EVENT_MINUTES: i64 = 60;

/// Default span of a listing query, in days, when no end is given.
pub const DEFAULT_LISTING_DAYS: i64 = 7;

/// Formats accepted for zone-less date-times, interpreted in the caller's zone.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Errors produced while interpreting a date/time argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    /// The argument was empty or whitespace.
    #[error("empty date/time expression")]
    Empty,

    /// Neither the structured formats nor the natural-language parser matched.
    #[error("could not understand date/time {input:?}: {reason}")]
    Unrecognized { input: String, reason: String },

    /// The local time does not exist in the zone (DST gap).
    #[error("local time {0} does not exist in this time zone")]
    NonexistentLocal(String),

    /// End precedes (or equals) start.
    #[error("end ({end}) must be after start ({start})")]
    EndNotAfterStart { start: String, end: String },

    /// One bound is an all-day date and the other is a timed value.
    #[error("start and end must both be dates or both be date-times")]
    MixedKinds,
}

/// Represents the time of a calendar event.
///
/// Google Calendar distinguishes timed events (`dateTime`) from all-day
/// events (`date`); this enum mirrors that split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific instant, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day date.
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a timed value from any zone.
    pub fn from_local<Tz: TimeZone>(dt: DateTime<Tz>) -> Self {
        Self::DateTime(dt.with_timezone(&Utc))
    }

    /// Returns `true` for all-day values.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Returns the instant if this is a timed value.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            Self::AllDay(_) => None,
        }
    }

    /// Returns the date if this is an all-day value.
    pub fn as_date(&self) -> Option<&NaiveDate> {
        match self {
            Self::AllDay(d) => Some(d),
            Self::DateTime(_) => None,
        }
    }

    /// Converts to UTC; all-day values become midnight UTC.
    pub fn to_utc_datetime(&self) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => date.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    /// Converts to UTC; all-day values become local midnight in `tz`.
    pub fn start_in<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => local_midnight(*date, tz),
        }
    }

    /// Shifts the value forward; all-day values move by whole days.
    pub fn advance(&self, by: Duration) -> Self {
        match self {
            Self::DateTime(dt) => Self::DateTime(*dt + by),
            Self::AllDay(date) => Self::AllDay(*date + Duration::days(by.num_days().max(1))),
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_utc_datetime().cmp(&other.to_utc_datetime())
    }
}

impl std::fmt::Display for EventTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::AllDay(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// A half-open query range `[start, end)` in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window, returning `None` when `end` is not after `start`.
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Creates a window covering a single local day.
    pub fn for_date<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Self {
        Self {
            start: local_midnight(date, tz),
            end: local_midnight(date + Duration::days(1), tz),
        }
    }

    /// Returns the duration of this window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Half-open containment check.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }
}

/// Parses one date/time argument relative to `now`.
///
/// Accepted, in order: RFC 3339, zone-less `YYYY-MM-DD[T ]HH:MM[:SS]`
/// (in `now`'s zone), `YYYY-MM-DD` (all-day), the bare words `today`,
/// `tomorrow` and `yesterday` (all-day), then anything `chrono-english`
/// understands ("next friday 10am", "in 2 hours").
pub fn parse_event_time<Tz>(input: &str, now: &DateTime<Tz>) -> Result<EventTime, TimeParseError>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let input = input.trim();
    if input.is_empty() {
        return Err(TimeParseError::Empty);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(EventTime::from_local(dt));
    }

    let tz = now.timezone();
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(EventTime::from_local)
                .ok_or_else(|| TimeParseError::NonexistentLocal(input.to_string()));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(EventTime::AllDay(date));
    }

    let today = now.date_naive();
    match input.to_ascii_lowercase().as_str() {
        "today" => return Ok(EventTime::AllDay(today)),
        "tomorrow" => return Ok(EventTime::AllDay(today + Duration::days(1))),
        "yesterday" => return Ok(EventTime::AllDay(today - Duration::days(1))),
        _ => {}
    }

    chrono_english::parse_date_string(input, now.clone(), chrono_english::Dialect::Uk)
        .map(EventTime::from_local)
        .map_err(|e| TimeParseError::Unrecognized {
            input: input.to_string(),
            reason: e.to_string(),
        })
}

/// Resolves the start/end pair of an event being created or moved.
///
/// Without an explicit end, timed events last [`DEFAULT_EVENT_MINUTES`] and
/// all-day events last one day. An explicit all-day end is inclusive and is
/// converted to Google's exclusive end date.
pub fn resolve_event_span<Tz>(
    start: &str,
    end: Option<&str>,
    now: &DateTime<Tz>,
) -> Result<(EventTime, EventTime), TimeParseError>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let start = parse_event_time(start, now)?;
    let end = match end {
        None => return Ok((start.clone(), start.advance(Duration::minutes(DEFAULT_EVENT_MINUTES)))),
        Some(end) => parse_event_time(end, now)?,
    };

    let end = match (&start, end) {
        (EventTime::AllDay(_), EventTime::AllDay(date)) => {
            EventTime::AllDay(date + Duration::days(1))
        }
        (EventTime::DateTime(_), end @ EventTime::DateTime(_)) => end,
        _ => return Err(TimeParseError::MixedKinds),
    };

    if end <= start {
        return Err(TimeParseError::EndNotAfterStart {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok((start, end))
}

/// Resolves the range of a listing or search query.
///
/// Start defaults to `now`, end to start plus [`DEFAULT_LISTING_DAYS`].
/// All-day bounds are widened to whole local days.
pub fn resolve_window<Tz>(
    start: Option<&str>,
    end: Option<&str>,
    now: &DateTime<Tz>,
) -> Result<TimeWindow, TimeParseError>
where
    Tz: TimeZone,
    Tz::Offset: Copy,
{
    let tz = now.timezone();
    let start = match start {
        Some(s) => parse_event_time(s, now)?.start_in(&tz),
        None => now.with_timezone(&Utc),
    };
    let end = match end {
        Some(e) => match parse_event_time(e, now)? {
            EventTime::AllDay(date) => local_midnight(date + Duration::days(1), &tz),
            EventTime::DateTime(dt) => dt,
        },
        None => start + Duration::days(DEFAULT_LISTING_DAYS),
    };

    TimeWindow::try_new(start, end).ok_or_else(|| TimeParseError::EndNotAfterStart {
        start: start.to_rfc3339(),
        end: end.to_rfc3339(),
    })
}

/// Local midnight of `date` in `tz`, falling back to UTC midnight when the
/// zone skips midnight entirely.
fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(chrono::NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}
