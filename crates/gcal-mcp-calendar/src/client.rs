//! Google Calendar v3 REST client.
//!
//! The client is stateless with respect to tokens: every call takes the
//! [`AccessGrant`] handed out by the token manager.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use gcal_mcp_auth::AccessGrant;
use gcal_mcp_core::EventTime;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CalendarError, CalendarResult};
use crate::model::{
    Attendee, Calendar, ColorPalette, Event, EventDraft, EventPatch, ListEventsQuery,
    MAX_PAGE_SIZE, ResponseStatus,
};

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Google Calendar API client.
#[derive(Debug, Clone)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendarClient {
    /// Creates a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> CalendarResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CalendarError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: CALENDAR_API_BASE.to_string(),
        })
    }

    /// Points the client at another API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Lists the calendars on the user's calendar list.
    pub async fn list_calendars(&self, grant: &AccessGrant) -> CalendarResult<Vec<Calendar>> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(format!("{}/users/me/calendarList", self.base_url))
                .bearer_auth(grant.access_token());
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: CalendarListResponse = self.send_json(request, "calendar list").await?;
            calendars.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!("fetched {} calendars", calendars.len());
        Ok(calendars)
    }

    /// Lists events overlapping the query window, recurring events expanded.
    pub async fn list_events(
        &self,
        grant: &AccessGrant,
        query: &ListEventsQuery,
    ) -> CalendarResult<Vec<Event>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let remaining = query.max_results.saturating_sub(events.len());
            let mut request = self
                .http_client
                .get(self.events_url(&query.calendar_id))
                .bearer_auth(grant.access_token())
                .query(&[
                    ("timeMin", query.window.start.to_rfc3339()),
                    ("timeMax", query.window.end.to_rfc3339()),
                    ("singleEvents", "true".to_string()),
                    ("orderBy", "startTime".to_string()),
                    ("maxResults", remaining.clamp(1, MAX_PAGE_SIZE).to_string()),
                ]);
            if let Some(ref text) = query.text {
                request = request.query(&[("q", text)]);
            }
            if let Some(ref token) = page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: EventListResponse = self.send_json(request, "event list").await?;
            events.extend(page.items.into_iter().filter_map(convert_event));

            if events.len() >= query.max_results {
                events.truncate(query.max_results);
                break;
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(
            "fetched {} events from calendar {}",
            events.len(),
            query.calendar_id
        );
        Ok(events)
    }

    /// Fetches one event.
    pub async fn get_event(
        &self,
        grant: &AccessGrant,
        calendar_id: &str,
        event_id: &str,
    ) -> CalendarResult<Event> {
        let request = self
            .http_client
            .get(self.event_url(calendar_id, event_id))
            .bearer_auth(grant.access_token());
        let event: ApiEvent = self.send_json(request, "event").await?;
        if event.status.as_deref() == Some("cancelled") {
            return Err(CalendarError::NotFound(format!("event {} was deleted", event_id)));
        }
        convert_event(event).ok_or_else(|| {
            CalendarError::invalid_response(format!("event {} has no usable start/end", event_id))
        })
    }

    /// Creates an event and returns it as stored by Google.
    pub async fn insert_event(
        &self,
        grant: &AccessGrant,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> CalendarResult<Event> {
        let request = self
            .http_client
            .post(self.events_url(calendar_id))
            .bearer_auth(grant.access_token())
            .query(&[("sendUpdates", send_updates(draft.notify_attendees))])
            .json(&ApiEventWrite::from_draft(draft));
        let event: ApiEvent = self.send_json(request, "created event").await?;
        convert_event(event)
            .ok_or_else(|| CalendarError::invalid_response("created event has no usable start/end"))
    }

    /// Applies a partial update and returns the updated event.
    pub async fn patch_event(
        &self,
        grant: &AccessGrant,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> CalendarResult<Event> {
        let request = self
            .http_client
            .patch(self.event_url(calendar_id, event_id))
            .bearer_auth(grant.access_token())
            .query(&[("sendUpdates", send_updates(patch.notify_attendees))])
            .json(&ApiEventWrite::from_patch(patch));
        let event: ApiEvent = self.send_json(request, "updated event").await?;
        convert_event(event)
            .ok_or_else(|| CalendarError::invalid_response("updated event has no usable start/end"))
    }

    /// Deletes an event.
    pub async fn delete_event(
        &self,
        grant: &AccessGrant,
        calendar_id: &str,
        event_id: &str,
        notify_attendees: bool,
    ) -> CalendarResult<()> {
        let response = self
            .http_client
            .delete(self.event_url(calendar_id, event_id))
            .bearer_auth(grant.access_token())
            .query(&[("sendUpdates", send_updates(notify_attendees))])
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, "event").await?;
        Ok(())
    }

    /// Fetches the calendar and event color palettes.
    pub async fn colors(&self, grant: &AccessGrant) -> CalendarResult<ColorPalette> {
        let request = self
            .http_client
            .get(format!("{}/colors", self.base_url))
            .bearer_auth(grant.access_token());
        self.send_json(request, "color palette").await
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{}/{}",
            self.events_url(calendar_id),
            urlencoding::encode(event_id)
        )
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> CalendarResult<T> {
        let response = request.send().await.map_err(transport_error)?;
        let response = check_status(response, what).await?;
        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::Network(format!("failed to read response: {}", e)))?;
        serde_json::from_str(&body).map_err(|e| {
            CalendarError::invalid_response(format!("failed to parse {}: {}", what, e))
        })
    }
}

fn send_updates(notify: bool) -> &'static str {
    if notify { "all" } else { "none" }
}

fn transport_error(e: reqwest::Error) -> CalendarError {
    if e.is_timeout() {
        CalendarError::Network("request timeout".to_string())
    } else if e.is_connect() {
        CalendarError::Network(format!("connection failed: {}", e))
    } else {
        CalendarError::Network(format!("request failed: {}", e))
    }
}

async fn check_status(response: Response, what: &str) -> CalendarResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, what))
}

/// Maps an error status onto [`CalendarError`].
fn status_error(status: StatusCode, body: &str, what: &str) -> CalendarError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|err| err.error.message)
        .unwrap_or_else(|_| body.trim().chars().take(200).collect());

    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            CalendarError::NotFound(format!("{} ({})", what, message))
        }
        StatusCode::UNAUTHORIZED => {
            warn!("access token rejected by the Calendar API");
            CalendarError::Api {
                status: status.as_u16(),
                message: format!("access token rejected; authorize again ({})", message),
            }
        }
        _ => CalendarError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Converts an API event; cancelled or malformed events yield `None`.
fn convert_event(event: ApiEvent) -> Option<Event> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }

    let id = event.id?;
    let start = match convert_time(&event.start) {
        Some(start) => start,
        None => {
            warn!("event {} has no usable start time", id);
            return None;
        }
    };
    let end = match convert_time(&event.end) {
        Some(end) => end,
        None => {
            warn!("event {} has no usable end time", id);
            return None;
        }
    };

    let attendees = event
        .attendees
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| {
            Some(Attendee {
                email: a.email?,
                display_name: a.display_name,
                response_status: ResponseStatus::from_api(a.response_status.as_deref()),
                optional: a.optional.unwrap_or(false),
                organizer: a.organizer.unwrap_or(false),
            })
        })
        .collect();

    Some(Event {
        id,
        summary: event.summary.unwrap_or_default(),
        description: event.description,
        location: event.location,
        time_zone: event.start.time_zone,
        start,
        end,
        status: event.status.unwrap_or_else(|| "confirmed".to_string()),
        html_link: event.html_link,
        hangout_link: event.hangout_link,
        color_id: event.color_id,
        organizer: event.organizer.and_then(|o| o.email),
        attendees,
        recurring_event_id: event.recurring_event_id,
        recurrence: event.recurrence.unwrap_or_default(),
    })
}

fn convert_time(time: &ApiEventTime) -> Option<EventTime> {
    match (&time.date_time, &time.date) {
        (Some(dt), _) => DateTime::parse_from_rfc3339(dt)
            .map_err(|e| warn!("failed to parse event time {:?}: {}", dt, e))
            .ok()
            .map(|dt| EventTime::DateTime(dt.with_timezone(&Utc))),
        (None, Some(date)) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| warn!("failed to parse event date {:?}: {}", date, e))
            .ok()
            .map(EventTime::AllDay),
        (None, None) => None,
    }
}

/// Response from the events.list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventListResponse {
    #[serde(default)]
    items: Vec<ApiEvent>,
    next_page_token: Option<String>,
}

/// Response from the calendarList endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<Calendar>,
    next_page_token: Option<String>,
}

/// A single event from the Google Calendar API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
    #[serde(default)]
    end: ApiEventTime,
    html_link: Option<String>,
    hangout_link: Option<String>,
    status: Option<String>,
    color_id: Option<String>,
    organizer: Option<ApiPerson>,
    recurring_event_id: Option<String>,
    recurrence: Option<Vec<String>>,
    attendees: Option<Vec<ApiAttendee>>,
}

/// Event time as read from the API.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPerson {
    email: Option<String>,
}

/// Attendee from the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttendee {
    email: Option<String>,
    display_name: Option<String>,
    organizer: Option<bool>,
    optional: Option<bool>,
    response_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Request body for insert and patch. Absent fields are left untouched.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventWrite {
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<ApiEventTimeWrite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end: Option<ApiEventTimeWrite>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attendees: Option<Vec<ApiAttendeeWrite>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    recurrence: Vec<String>,
}

/// Event time as written to the API.
///
/// Both `date` and `dateTime` are always serialized so that a patch turning
/// a timed event into an all-day one (or back) clears the other field.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTimeWrite {
    date: Option<String>,
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiAttendeeWrite {
    email: String,
}

impl ApiEventTimeWrite {
    fn new(time: &EventTime, time_zone: Option<&String>) -> Self {
        match time {
            EventTime::DateTime(dt) => Self {
                date: None,
                date_time: Some(dt.to_rfc3339()),
                time_zone: time_zone.cloned(),
            },
            EventTime::AllDay(date) => Self {
                date: Some(date.format("%Y-%m-%d").to_string()),
                date_time: None,
                time_zone: None,
            },
        }
    }
}

fn attendees_write(emails: &[String]) -> Vec<ApiAttendeeWrite> {
    emails
        .iter()
        .map(|email| ApiAttendeeWrite {
            email: email.trim().to_string(),
        })
        .collect()
}

impl ApiEventWrite {
    fn from_draft(draft: &EventDraft) -> Self {
        Self {
            summary: Some(draft.summary.clone()),
            description: draft.description.clone(),
            location: draft.location.clone(),
            start: Some(ApiEventTimeWrite::new(&draft.start, draft.time_zone.as_ref())),
            end: Some(ApiEventTimeWrite::new(&draft.end, draft.time_zone.as_ref())),
            attendees: (!draft.attendees.is_empty()).then(|| attendees_write(&draft.attendees)),
            color_id: draft.color_id.clone(),
            recurrence: draft.recurrence.clone(),
        }
    }

    fn from_patch(patch: &EventPatch) -> Self {
        Self {
            summary: patch.summary.clone(),
            description: patch.description.clone(),
            location: patch.location.clone(),
            start: patch.start.as_ref().map(|t| ApiEventTimeWrite::new(t, None)),
            end: patch.end.as_ref().map(|t| ApiEventTimeWrite::new(t, None)),
            attendees: patch.attendees.as_deref().map(attendees_write),
            color_id: patch.color_id.clone(),
            recurrence: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parse_event_list_response() {
        let json = r#"{
            "items": [
                {
                    "id": "event1",
                    "summary": "Test Meeting",
                    "start": { "dateTime": "2024-03-15T10:00:00Z" },
                    "end": { "dateTime": "2024-03-15T11:00:00Z" },
                    "status": "confirmed",
                    "attendees": [
                        { "email": "ana@example.com", "responseStatus": "accepted", "organizer": true },
                        { "displayName": "no email" }
                    ]
                },
                { "id": "gone", "status": "cancelled" }
            ],
            "nextPageToken": "page-2"
        }"#;

        let response: EventListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.next_page_token.as_deref(), Some("page-2"));
        let events: Vec<Event> = response.items.into_iter().filter_map(convert_event).collect();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.summary, "Test Meeting");
        assert_eq!(
            event.start,
            EventTime::DateTime(Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap())
        );
        assert_eq!(event.attendees.len(), 1);
        assert_eq!(event.attendees[0].response_status, ResponseStatus::Accepted);
        assert!(event.attendees[0].organizer);
    }

    #[test]
    fn parse_all_day_event() {
        let json = r#"{
            "id": "event1",
            "summary": "All Day Event",
            "start": { "date": "2024-03-15" },
            "end": { "date": "2024-03-16" }
        }"#;

        let event = convert_event(serde_json::from_str(json).unwrap()).unwrap();
        assert!(event.is_all_day());
        assert_eq!(event.duration(), chrono::Duration::days(1));
        assert_eq!(event.status, "confirmed");
    }

    #[test]
    fn parse_offset_times_to_utc() {
        let json = r#"{
            "id": "e",
            "start": { "dateTime": "2024-03-15T10:00:00+01:00", "timeZone": "Europe/Paris" },
            "end": { "dateTime": "2024-03-15T10:30:00+01:00" }
        }"#;
        let event = convert_event(serde_json::from_str(json).unwrap()).unwrap();
        assert_eq!(event.time_zone.as_deref(), Some("Europe/Paris"));
        assert_eq!(
            event.start.as_datetime(),
            Some(&Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap())
        );
        assert_eq!(event.summary, "");
    }

    #[test]
    fn malformed_time_drops_event() {
        let json = r#"{ "id": "e", "start": { "dateTime": "soon" }, "end": { "date": "2024-03-16" } }"#;
        assert!(convert_event(serde_json::from_str(json).unwrap()).is_none());
    }

    #[test]
    fn parse_calendar_list() {
        let json = r#"{
            "items": [
                {
                    "id": "primary",
                    "summary": "My Calendar",
                    "primary": true,
                    "timeZone": "America/New_York",
                    "accessRole": "owner"
                },
                { "id": "work@example.com", "summary": "Work Calendar" }
            ]
        }"#;

        let response: CalendarListResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.items.len(), 2);
        assert!(response.items[0].primary);
        assert_eq!(response.items[0].access_role.as_deref(), Some("owner"));
        assert!(!response.items[1].primary);
    }

    #[test]
    fn draft_body_shape() {
        let draft = EventDraft::new(
            "Lunch",
            EventTime::DateTime(Utc.with_ymd_and_hms(2025, 2, 5, 12, 0, 0).unwrap()),
            EventTime::DateTime(Utc.with_ymd_and_hms(2025, 2, 5, 13, 0, 0).unwrap()),
        )
        .with_location("Cafeteria")
        .with_attendees(vec![" ana@example.com ".into()]);

        let body = serde_json::to_value(ApiEventWrite::from_draft(&draft)).unwrap();
        insta::assert_json_snapshot!(body, @r###"
        {
          "attendees": [
            {
              "email": "ana@example.com"
            }
          ],
          "end": {
            "date": null,
            "dateTime": "2025-02-05T13:00:00+00:00"
          },
          "location": "Cafeteria",
          "start": {
            "date": null,
            "dateTime": "2025-02-05T12:00:00+00:00"
          },
          "summary": "Lunch"
        }
        "###);
    }

    #[test]
    fn patch_body_only_carries_changes() {
        let patch = EventPatch {
            start: Some(EventTime::AllDay(NaiveDate::from_ymd_opt(2025, 2, 7).unwrap())),
            description: Some(String::new()),
            ..EventPatch::default()
        };
        let body = serde_json::to_value(ApiEventWrite::from_patch(&patch)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "description": "",
                "start": { "date": "2025-02-07", "dateTime": null }
            })
        );
    }

    #[test]
    fn status_errors() {
        let body = r#"{ "error": { "code": 404, "message": "Not Found" } }"#;
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, body, "event"),
            CalendarError::NotFound("event (Not Found)".to_string())
        );
        assert!(matches!(
            status_error(StatusCode::GONE, "", "event"),
            CalendarError::NotFound(_)
        ));
        let err = status_error(StatusCode::UNAUTHORIZED, "{}", "event list");
        assert!(err.needs_authorization());
        let err = status_error(StatusCode::FORBIDDEN, r#"{ "error": { "message": "Forbidden" } }"#, "event");
        assert_eq!(
            err,
            CalendarError::Api {
                status: 403,
                message: "Forbidden".to_string()
            }
        );
    }

    #[test]
    fn colors_parse() {
        let json = r##"{
            "kind": "calendar#colors",
            "calendar": { "1": { "background": "#ac725e", "foreground": "#1d1d1d" } },
            "event": { "11": { "background": "#dc2127", "foreground": "#1d1d1d" } }
        }"##;
        let palette: ColorPalette = serde_json::from_str(json).unwrap();
        assert_eq!(palette.event["11"].background, "#dc2127");
        assert_eq!(palette.calendar.len(), 1);
    }

    #[test]
    fn base_url_trailing_slash() {
        let client = GoogleCalendarClient::new(Duration::from_secs(5))
            .unwrap()
            .with_base_url("http://127.0.0.1:1/api/");
        assert_eq!(
            client.event_url("team@group.calendar.google.com", "abc/1"),
            "http://127.0.0.1:1/api/calendars/team%40group.calendar.google.com/events/abc%2F1"
        );
    }
}
