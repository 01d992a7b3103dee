//! Text rendering of tool results.
//!
//! Times are shown in the zone passed by the caller; the server uses the
//! local zone and tests use UTC.

use std::fmt::{self, Write as _};

use chrono::{DateTime, TimeZone, Utc};
use gcal_mcp_auth::{AuthError, AuthStatus, ClearReport, SessionState};
use gcal_mcp_calendar::{Calendar, CalendarError, ColorDefinition, ColorPalette, Event};
use gcal_mcp_core::EventTime;

const UNTITLED: &str = "(no title)";

/// Renders the calendar list.
pub fn format_calendars(calendars: &[Calendar]) -> String {
    if calendars.is_empty() {
        return "No calendars found.".to_string();
    }

    let mut out = format!("Calendars ({}):", calendars.len());
    for calendar in calendars {
        let mut tags = Vec::new();
        if calendar.primary {
            tags.push("primary");
        }
        if let Some(ref role) = calendar.access_role {
            tags.push(role.as_str());
        }
        let name = if calendar.summary.is_empty() {
            UNTITLED
        } else {
            calendar.summary.as_str()
        };
        let _ = write!(out, "\n- {} ({})", name, calendar.id);
        if !tags.is_empty() {
            let _ = write!(out, " [{}]", tags.join(", "));
        }
    }
    out
}

/// Renders an event listing, one line per event.
pub fn format_events<Tz>(events: &[Event], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    if events.is_empty() {
        return "No events found.".to_string();
    }

    let mut out = format!("Events ({}):", events.len());
    for event in events {
        let _ = write!(
            out,
            "\n- {} | {} | id: {}",
            format_span(&event.start, &event.end, tz),
            title(event),
            event.id
        );
    }
    out
}

/// Renders one event with every populated field.
pub fn format_event<Tz>(event: &Event, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut out = title(event).to_string();
    let _ = write!(out, "\nWhen: {}", format_span(&event.start, &event.end, tz));
    if let Some(ref location) = event.location {
        let _ = write!(out, "\nWhere: {}", location);
    }
    if !event.status.is_empty() {
        let _ = write!(out, "\nStatus: {}", event.status);
    }
    if let Some(ref organizer) = event.organizer {
        let _ = write!(out, "\nOrganizer: {}", organizer);
    }
    if !event.attendees.is_empty() {
        out.push_str("\nAttendees:");
        for attendee in &event.attendees {
            let name = attendee.display_name.as_deref().unwrap_or(&attendee.email);
            let _ = write!(out, "\n  - {} ({}", name, attendee.response_status);
            if attendee.optional {
                out.push_str(", optional");
            }
            out.push(')');
        }
    }
    for rule in &event.recurrence {
        let _ = write!(out, "\nRecurrence: {}", rule);
    }
    if let Some(ref color) = event.color_id {
        let _ = write!(out, "\nColor: {}", color);
    }
    if let Some(ref description) = event.description {
        let _ = write!(out, "\nDescription: {}", description.trim());
    }
    if let Some(ref link) = event.html_link {
        let _ = write!(out, "\nLink: {}", link);
    }
    if let Some(ref meet) = event.hangout_link {
        let _ = write!(out, "\nMeet: {}", meet);
    }
    let _ = write!(out, "\nEvent ID: {}", event.id);
    out
}

/// Renders the start/end of an event.
///
/// All-day ends are exclusive in the API and shown inclusive here.
pub fn format_span<Tz>(start: &EventTime, end: &EventTime, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match (start, end) {
        (EventTime::AllDay(first), EventTime::AllDay(end)) => {
            let last = end.pred_opt().unwrap_or(*end);
            if last <= *first {
                format!("{} (all day)", first)
            } else {
                format!("{} to {} (all day)", first, last)
            }
        }
        _ => {
            let start = start.to_utc_datetime().with_timezone(tz);
            let end = end.to_utc_datetime().with_timezone(tz);
            if start.date_naive() == end.date_naive() {
                format!("{}-{}", start.format("%Y-%m-%d %H:%M"), end.format("%H:%M"))
            } else {
                format!(
                    "{} to {}",
                    start.format("%Y-%m-%d %H:%M"),
                    end.format("%Y-%m-%d %H:%M")
                )
            }
        }
    }
}

/// Renders the color palettes.
pub fn format_colors(palette: &ColorPalette) -> String {
    if palette.event.is_empty() && palette.calendar.is_empty() {
        return "No colors available.".to_string();
    }

    let mut sections = Vec::new();
    for (heading, colors) in [("Event colors", &palette.event), ("Calendar colors", &palette.calendar)] {
        if colors.is_empty() {
            continue;
        }
        let mut section = format!("{}:", heading);
        for (id, ColorDefinition { background, foreground }) in colors {
            let _ = write!(section, "\n  {}: background {}, text {}", id, background, foreground);
        }
        sections.push(section);
    }
    sections.join("\n")
}

/// Renders the session snapshot.
pub fn format_status<Tz>(status: &AuthStatus, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let mut out = format!("Session: {}", status.state);
    if let Some(expires_at) = status.expires_at {
        let _ = write!(out, "\nExpires: {}", format_instant(expires_at, tz));
        let _ = write!(
            out,
            "\nRefresh due: {}",
            if status.needs_refresh { "yes" } else { "no" }
        );
    }
    if !status.scopes.is_empty() {
        let _ = write!(out, "\nScopes: {}", status.scopes.join(" "));
    }
    let _ = write!(out, "\nCredentials: {}", status.credentials_location);
    if status.state == SessionState::Unconfigured {
        out.push_str(" (not loaded)");
    }
    if let Some(ref url) = status.auth_url {
        let _ = write!(out, "\nAuthorize at: {}", url);
    }
    out
}

/// Renders the outcome of a sign-out.
pub fn format_clear_report(report: &ClearReport) -> String {
    match (report.had_token, report.revoke_error.as_ref()) {
        (false, _) => "No stored token; nothing to revoke.".to_string(),
        (true, Some(err)) => format!("Signed out locally. Remote revocation failed: {}", err),
        (true, None) => "Signed out and revoked access.".to_string(),
    }
}

/// Turns a calendar failure into a message a human can act on.
pub fn describe_error(err: &CalendarError) -> String {
    match err {
        CalendarError::Auth(auth) => describe_auth_error(auth),
        other => other.to_string(),
    }
}

/// Turns an auth failure into a message a human can act on.
pub fn describe_auth_error(err: &AuthError) -> String {
    match err {
        AuthError::NotAuthenticated { auth_url } => format!(
            "Not authenticated with Google Calendar.\n\
             Open this URL to grant access:\n{}\n\
             Then call complete_auth with the authorization code.",
            auth_url
        ),
        AuthError::NotConfigured { location, message } => format!(
            "Google OAuth credentials are not configured ({}).\n\
             Place the OAuth client JSON at {} or set client_id and client_secret in config.toml.",
            message, location
        ),
        AuthError::RefreshFailed(reason) => format!(
            "The Google session could not be renewed ({}).\n\
             Call auth_url to sign in again.",
            reason
        ),
        other => other.to_string(),
    }
}

fn title(event: &Event) -> &str {
    if event.summary.trim().is_empty() {
        UNTITLED
    } else {
        event.summary.as_str()
    }
}

fn format_instant<Tz>(instant: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    instant.with_timezone(tz).format("%Y-%m-%d %H:%M:%S %:z").to_string()
}
