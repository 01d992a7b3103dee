//! Calendar operations backed by the token manager.

use chrono::Duration;
use gcal_mcp_auth::TokenManager;
use gcal_mcp_core::time::DEFAULT_EVENT_MINUTES;
use tracing::{debug, info};

use crate::client::GoogleCalendarClient;
use crate::error::{CalendarError, CalendarResult};
use crate::model::{Calendar, ColorPalette, Event, EventDraft, EventPatch, ListEventsQuery};

/// Calendar used when the caller names none.
pub const DEFAULT_CALENDAR: &str = "primary";

/// Calendar CRUD over the Google Calendar API.
///
/// Every operation acquires a grant from the [`TokenManager`] first, so a
/// missing or refused session surfaces as [`CalendarError::Auth`].
#[derive(Debug, Clone)]
pub struct CalendarService {
    tokens: TokenManager,
    client: GoogleCalendarClient,
    default_calendar: String,
}

impl CalendarService {
    /// Creates a service using the `primary` calendar by default.
    pub fn new(tokens: TokenManager, client: GoogleCalendarClient) -> Self {
        Self {
            tokens,
            client,
            default_calendar: DEFAULT_CALENDAR.to_string(),
        }
    }

    /// Sets the calendar used when none is given.
    pub fn with_default_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.default_calendar = calendar_id.into();
        self
    }

    /// The token manager behind this service.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// The calendar used when none is given.
    pub fn default_calendar(&self) -> &str {
        &self.default_calendar
    }

    /// Returns `calendar_id` unless it is absent or blank.
    pub fn calendar_or_default<'a>(&'a self, calendar_id: Option<&'a str>) -> &'a str {
        match calendar_id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => &self.default_calendar,
        }
    }

    /// Lists the user's calendars.
    pub async fn list_calendars(&self) -> CalendarResult<Vec<Calendar>> {
        let grant = self.tokens.acquire_client().await?;
        self.client.list_calendars(&grant).await
    }

    /// Lists events in a window.
    pub async fn list_events(&self, query: &ListEventsQuery) -> CalendarResult<Vec<Event>> {
        if query.max_results == 0 {
            return Err(CalendarError::invalid_argument("max_results must be positive"));
        }
        let grant = self.tokens.acquire_client().await?;
        self.client.list_events(&grant, query).await
    }

    /// Lists events matching free text in a window.
    pub async fn search_events(&self, query: &ListEventsQuery) -> CalendarResult<Vec<Event>> {
        if query.text.is_none() {
            return Err(CalendarError::invalid_argument("search text is empty"));
        }
        self.list_events(query).await
    }

    /// Fetches one event.
    pub async fn get_event(&self, calendar_id: &str, event_id: &str) -> CalendarResult<Event> {
        let event_id = require_id(event_id)?;
        let grant = self.tokens.acquire_client().await?;
        self.client.get_event(&grant, calendar_id, event_id).await
    }

    /// Creates an event.
    pub async fn create_event(
        &self,
        calendar_id: &str,
        draft: &EventDraft,
    ) -> CalendarResult<Event> {
        draft.validate()?;
        let grant = self.tokens.acquire_client().await?;
        let event = self.client.insert_event(&grant, calendar_id, draft).await?;
        info!(calendar_id, event_id = %event.id, "created event");
        Ok(event)
    }

    /// Updates an event.
    ///
    /// Moving the start without giving an end keeps the event's length.
    pub async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        mut patch: EventPatch,
    ) -> CalendarResult<Event> {
        let event_id = require_id(event_id)?;
        patch.validate()?;
        let grant = self.tokens.acquire_client().await?;

        if let (Some(start), true) = (patch.start.clone(), patch.end.is_none()) {
            let existing = self.client.get_event(&grant, calendar_id, event_id).await?;
            let end = if start.is_all_day() == existing.is_all_day() {
                start.advance(existing.duration())
            } else {
                start.advance(Duration::minutes(DEFAULT_EVENT_MINUTES))
            };
            debug!(%end, "keeping event length for moved start");
            patch.end = Some(end);
            patch.validate()?;
        }

        let event = self
            .client
            .patch_event(&grant, calendar_id, event_id, &patch)
            .await?;
        info!(calendar_id, event_id, "updated event");
        Ok(event)
    }

    /// Deletes an event.
    pub async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        notify_attendees: bool,
    ) -> CalendarResult<()> {
        let event_id = require_id(event_id)?;
        let grant = self.tokens.acquire_client().await?;
        self.client
            .delete_event(&grant, calendar_id, event_id, notify_attendees)
            .await?;
        info!(calendar_id, event_id, "deleted event");
        Ok(())
    }

    /// Fetches the color palettes.
    pub async fn list_colors(&self) -> CalendarResult<ColorPalette> {
        let grant = self.tokens.acquire_client().await?;
        self.client.colors(&grant).await
    }
}

fn require_id(event_id: &str) -> CalendarResult<&str> {
    let event_id = event_id.trim();
    if event_id.is_empty() {
        return Err(CalendarError::invalid_argument("event_id is empty"));
    }
    Ok(event_id)
}
