//! Calendar domain types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Duration;
use gcal_mcp_core::{EventTime, TimeWindow};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, CalendarResult};

/// Google's ceiling for `maxResults` on a single events page.
pub const MAX_PAGE_SIZE: usize = 250;

/// Number of events returned when the caller does not say.
pub const DEFAULT_MAX_RESULTS: usize = 25;

/// An entry of the user's calendar list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Calendar {
    /// The calendar ID.
    pub id: String,
    /// The calendar name.
    #[serde(default)]
    pub summary: String,
    /// The calendar description.
    pub description: Option<String>,
    /// Whether this is the primary calendar.
    #[serde(default)]
    pub primary: bool,
    /// The calendar time zone.
    pub time_zone: Option<String>,
    /// The caller's access role (`owner`, `writer`, `reader`, ...).
    pub access_role: Option<String>,
    /// Background color.
    pub background_color: Option<String>,
}

/// Attendee response state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseStatus {
    /// The attendee has not responded.
    #[default]
    NeedsAction,
    /// The attendee accepted.
    Accepted,
    /// The attendee declined.
    Declined,
    /// The attendee tentatively accepted.
    Tentative,
}

impl ResponseStatus {
    /// Parses the API value, treating unknown values as `NeedsAction`.
    pub fn from_api(value: Option<&str>) -> Self {
        match value {
            Some("accepted") => Self::Accepted,
            Some("declined") => Self::Declined,
            Some("tentative") => Self::Tentative,
            _ => Self::NeedsAction,
        }
    }

    /// Returns the API value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsAction => "needsAction",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Tentative => "tentative",
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attendee {
    /// Attendee email.
    pub email: String,
    /// Display name, if known.
    pub display_name: Option<String>,
    /// Response state.
    pub response_status: ResponseStatus,
    /// Whether the attendee is optional.
    pub optional: bool,
    /// Whether the attendee organizes the event.
    pub organizer: bool,
}

/// A calendar event as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Event ID.
    pub id: String,
    /// Event title.
    pub summary: String,
    /// Description, if any.
    pub description: Option<String>,
    /// Location, if any.
    pub location: Option<String>,
    /// Start time.
    pub start: EventTime,
    /// End time (exclusive for all-day events).
    pub end: EventTime,
    /// Time zone the event was created in.
    pub time_zone: Option<String>,
    /// `confirmed`, `tentative` or `cancelled`.
    pub status: String,
    /// Link to the event in the Google Calendar UI.
    pub html_link: Option<String>,
    /// Google Meet link, if any.
    pub hangout_link: Option<String>,
    /// Color ID from the event palette.
    pub color_id: Option<String>,
    /// Organizer email.
    pub organizer: Option<String>,
    /// Attendees.
    pub attendees: Vec<Attendee>,
    /// Set on instances of a recurring event.
    pub recurring_event_id: Option<String>,
    /// RRULE/EXDATE lines on the parent of a recurring series.
    pub recurrence: Vec<String>,
}

impl Event {
    /// Returns true for all-day events.
    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }

    /// Returns the event length.
    pub fn duration(&self) -> Duration {
        self.end.to_utc_datetime() - self.start.to_utc_datetime()
    }
}

/// Parameters of an events listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEventsQuery {
    /// Calendar to list.
    pub calendar_id: String,
    /// Time range; events overlapping it are returned.
    pub window: TimeWindow,
    /// Maximum events to return.
    pub max_results: usize,
    /// Free-text filter (`q`).
    pub text: Option<String>,
}

impl ListEventsQuery {
    /// Creates a query with the default result limit.
    pub fn new(calendar_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            window,
            max_results: DEFAULT_MAX_RESULTS,
            text: None,
        }
    }

    /// Sets the result limit.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Sets the free-text filter. Blank text clears it.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = (!text.trim().is_empty()).then(|| text.trim().to_string());
        self
    }
}

/// A new event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    /// Event title.
    pub summary: String,
    /// Start time.
    pub start: EventTime,
    /// End time.
    pub end: EventTime,
    /// Description.
    pub description: Option<String>,
    /// Location.
    pub location: Option<String>,
    /// Attendee emails.
    pub attendees: Vec<String>,
    /// Color ID from the event palette.
    pub color_id: Option<String>,
    /// IANA time zone name, required by Google for recurring events.
    pub time_zone: Option<String>,
    /// RRULE lines.
    pub recurrence: Vec<String>,
    /// Email attendees about the change.
    pub notify_attendees: bool,
}

impl EventDraft {
    /// Creates a draft with the required fields.
    pub fn new(summary: impl Into<String>, start: EventTime, end: EventTime) -> Self {
        Self {
            summary: summary.into(),
            start,
            end,
            description: None,
            location: None,
            attendees: Vec::new(),
            color_id: None,
            time_zone: None,
            recurrence: Vec::new(),
            notify_attendees: false,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Sets the attendee emails.
    pub fn with_attendees(mut self, attendees: Vec<String>) -> Self {
        self.attendees = attendees;
        self
    }

    /// Checks the draft before it is sent.
    pub fn validate(&self) -> CalendarResult<()> {
        if self.summary.trim().is_empty() {
            return Err(CalendarError::invalid_argument("event summary is empty"));
        }
        validate_span(&self.start, &self.end)?;
        validate_emails(&self.attendees)
    }
}

/// A partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    /// New title.
    pub summary: Option<String>,
    /// New description; an empty string clears it.
    pub description: Option<String>,
    /// New location; an empty string clears it.
    pub location: Option<String>,
    /// New start.
    pub start: Option<EventTime>,
    /// New end.
    pub end: Option<EventTime>,
    /// Replacement attendee list.
    pub attendees: Option<Vec<String>>,
    /// New color ID.
    pub color_id: Option<String>,
    /// Email attendees about the change.
    pub notify_attendees: bool,
}

impl EventPatch {
    /// Returns true when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.attendees.is_none()
            && self.color_id.is_none()
    }

    /// Checks the patch before it is sent.
    pub fn validate(&self) -> CalendarResult<()> {
        if self.is_empty() {
            return Err(CalendarError::invalid_argument("nothing to update"));
        }
        if let Some(ref summary) = self.summary {
            if summary.trim().is_empty() {
                return Err(CalendarError::invalid_argument("event summary is empty"));
            }
        }
        if let (Some(start), Some(end)) = (&self.start, &self.end) {
            validate_span(start, end)?;
        }
        match self.attendees {
            Some(ref attendees) => validate_emails(attendees),
            None => Ok(()),
        }
    }
}

/// One entry of the color palette.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColorDefinition {
    /// Background color (`#rrggbb`).
    pub background: String,
    /// Foreground color (`#rrggbb`).
    pub foreground: String,
}

/// The calendar and event color palettes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColorPalette {
    /// Calendar colors by ID.
    #[serde(default)]
    pub calendar: BTreeMap<String, ColorDefinition>,
    /// Event colors by ID.
    #[serde(default)]
    pub event: BTreeMap<String, ColorDefinition>,
}

fn validate_span(start: &EventTime, end: &EventTime) -> CalendarResult<()> {
    if start.is_all_day() != end.is_all_day() {
        return Err(CalendarError::invalid_argument(
            "start and end must both be dates or both be date-times",
        ));
    }
    if end <= start {
        return Err(CalendarError::invalid_argument(format!(
            "end ({}) must be after start ({})",
            end, start
        )));
    }
    Ok(())
}

fn validate_emails(emails: &[String]) -> CalendarResult<()> {
    for email in emails {
        let email = email.trim();
        let valid = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid {
            return Err(CalendarError::invalid_argument(format!(
                "{:?} is not an email address",
                email
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;

    fn at(hour: u32) -> EventTime {
        EventTime::DateTime(Utc.with_ymd_and_hms(2025, 2, 5, hour, 0, 0).unwrap())
    }

    fn day(d: u32) -> EventTime {
        EventTime::AllDay(NaiveDate::from_ymd_opt(2025, 2, d).unwrap())
    }

    #[test]
    fn draft_validation() {
        assert!(EventDraft::new("Standup", at(9), at(10)).validate().is_ok());
        assert!(EventDraft::new("Offsite", day(5), day(6)).validate().is_ok());

        let err = EventDraft::new(" ", at(9), at(10)).validate().unwrap_err();
        assert!(err.to_string().contains("summary"));
        let err = EventDraft::new("Backwards", at(10), at(9)).validate().unwrap_err();
        assert!(matches!(err, CalendarError::InvalidArgument(_)));
        let err = EventDraft::new("Mixed", at(9), day(6)).validate().unwrap_err();
        assert!(err.to_string().contains("both be dates"));
    }

    #[test]
    fn draft_rejects_bad_attendees() {
        let draft = EventDraft::new("Sync", at(9), at(10))
            .with_attendees(vec!["ana@example.com".into(), "bob".into()]);
        let err = draft.validate().unwrap_err();
        assert!(err.to_string().contains("\"bob\""));
    }

    #[test]
    fn patch_validation() {
        assert!(EventPatch::default().validate().is_err());
        let patch = EventPatch {
            location: Some(String::new()),
            ..EventPatch::default()
        };
        assert!(patch.validate().is_ok());
        let patch = EventPatch {
            start: Some(at(11)),
            end: Some(at(10)),
            ..EventPatch::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn query_text_is_trimmed() {
        let window = TimeWindow::try_new(
            Utc.with_ymd_and_hms(2025, 2, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 2, 6, 0, 0, 0).unwrap(),
        )
        .unwrap();
        let query = ListEventsQuery::new("primary", window.clone()).with_text("  dentist ");
        assert_eq!(query.text.as_deref(), Some("dentist"));
        assert_eq!(query.max_results, DEFAULT_MAX_RESULTS);
        assert!(ListEventsQuery::new("primary", window).with_text("   ").text.is_none());
    }

    #[test]
    fn response_status_from_api() {
        assert_eq!(ResponseStatus::from_api(Some("accepted")), ResponseStatus::Accepted);
        assert_eq!(ResponseStatus::from_api(Some("weird")), ResponseStatus::NeedsAction);
        assert_eq!(ResponseStatus::Tentative.to_string(), "tentative");
    }
}
