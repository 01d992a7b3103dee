//! Google Calendar operations.
//!
//! [`GoogleCalendarClient`] speaks the REST API; [`CalendarService`] pairs it
//! with the token manager so every call carries a fresh access token.

pub mod client;
pub mod error;
pub mod model;
pub mod service;

pub use client::GoogleCalendarClient;
pub use error::{CalendarError, CalendarResult};
pub use model::{
    Attendee, Calendar, ColorDefinition, ColorPalette, Event, EventDraft, EventPatch,
    ListEventsQuery, ResponseStatus,
};
pub use service::{CalendarService, DEFAULT_CALENDAR};
