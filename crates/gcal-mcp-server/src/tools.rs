//! MCP tool server.
//!
//! Tools are declared by hand: [`ToolName`] owns each tool's name,
//! description and JSON schema, and [`CalendarServer::call`] turns a parsed
//! call into a calendar or token operation. Failures become tool error
//! results whose text tells the user what to do next.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, TimeZone};
use gcal_mcp_auth::TokenManager;
use gcal_mcp_calendar::{CalendarService, EventDraft, EventPatch, ListEventsQuery};
use gcal_mcp_core::{EventTime, parse_event_time, resolve_event_span, resolve_window};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, model::*, service::RequestContext};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::callback;
use crate::error::ToolError;
use crate::format;

const INSTRUCTIONS: &str = "Google Calendar tools. Dates accept RFC 3339, YYYY-MM-DD (all day), \
    YYYY-MM-DD HH:MM (local time) or natural language such as \"next friday 3pm\". \
    If a tool reports that authorization is needed, show the user the URL and pass the \
    resulting code to complete_auth.";

const DATE_HINT: &str =
    "RFC 3339, YYYY-MM-DD for all-day, YYYY-MM-DD HH:MM in local time, or natural language";

/// The tools this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ListCalendars,
    ListEvents,
    SearchEvents,
    GetEvent,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    ListColors,
    AuthStatus,
    AuthUrl,
    CompleteAuth,
    ClearAuth,
}

impl ToolName {
    /// Every tool, in listing order.
    pub const ALL: [ToolName; 12] = [
        Self::ListCalendars,
        Self::ListEvents,
        Self::SearchEvents,
        Self::GetEvent,
        Self::CreateEvent,
        Self::UpdateEvent,
        Self::DeleteEvent,
        Self::ListColors,
        Self::AuthStatus,
        Self::AuthUrl,
        Self::CompleteAuth,
        Self::ClearAuth,
    ];

    /// Wire name of the tool.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListCalendars => "list_calendars",
            Self::ListEvents => "list_events",
            Self::SearchEvents => "search_events",
            Self::GetEvent => "get_event",
            Self::CreateEvent => "create_event",
            Self::UpdateEvent => "update_event",
            Self::DeleteEvent => "delete_event",
            Self::ListColors => "list_colors",
            Self::AuthStatus => "auth_status",
            Self::AuthUrl => "auth_url",
            Self::CompleteAuth => "complete_auth",
            Self::ClearAuth => "clear_auth",
        }
    }

    /// Looks a tool up by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.as_str() == name)
    }

    /// One-line description shown to the client.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ListCalendars => "List the calendars in the user's calendar list.",
            Self::ListEvents => {
                "List events in a time range (default: the next 7 days), recurring events expanded."
            }
            Self::SearchEvents => "Find events whose text matches a query within a time range.",
            Self::GetEvent => "Show every detail of one event.",
            Self::CreateEvent => {
                "Create an event. Without an end, timed events last one hour and all-day events one day."
            }
            Self::UpdateEvent => {
                "Change fields of an event. Moving only the start keeps the event's length."
            }
            Self::DeleteEvent => "Delete an event.",
            Self::ListColors => "List the color IDs usable for events and calendars.",
            Self::AuthStatus => "Show whether Google Calendar access is configured and authorized.",
            Self::AuthUrl => "Get the URL where the user grants Google Calendar access.",
            Self::CompleteAuth => {
                "Finish authorization with the code (or full redirect URL) from the consent page."
            }
            Self::ClearAuth => "Sign out: revoke the stored grant and delete the token.",
        }
    }

    /// JSON schema of the tool's arguments.
    pub fn input_schema(&self) -> Value {
        match self {
            Self::ListCalendars
            | Self::ListColors
            | Self::AuthStatus
            | Self::AuthUrl
            | Self::ClearAuth => object(json!({}), &[]),
            Self::ListEvents => object(range_properties(), &[]),
            Self::SearchEvents => {
                let mut properties = range_properties();
                properties["query"] = json!({
                    "type": "string",
                    "description": "Free text matched against title, description, location and attendees",
                });
                object(properties, &["query"])
            }
            Self::GetEvent => object(
                json!({ "calendar_id": calendar_id_property(), "event_id": event_id_property() }),
                &["event_id"],
            ),
            Self::CreateEvent => {
                let mut properties = event_properties();
                properties["calendar_id"] = calendar_id_property();
                properties["time_zone"] = json!({
                    "type": "string",
                    "description": "IANA time zone, e.g. Europe/Paris; needed for recurring timed events",
                });
                properties["recurrence"] = json!({
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "RRULE/EXDATE lines, e.g. RRULE:FREQ=WEEKLY;COUNT=4",
                });
                object(properties, &["summary", "start"])
            }
            Self::UpdateEvent => {
                let mut properties = event_properties();
                properties["calendar_id"] = calendar_id_property();
                properties["event_id"] = event_id_property();
                object(properties, &["event_id"])
            }
            Self::DeleteEvent => object(
                json!({
                    "calendar_id": calendar_id_property(),
                    "event_id": event_id_property(),
                    "send_updates": send_updates_property(),
                }),
                &["event_id"],
            ),
            Self::CompleteAuth => object(
                json!({
                    "code": {
                        "type": "string",
                        "description": "Authorization code, or the whole URL the browser was redirected to",
                    }
                }),
                &["code"],
            ),
        }
    }

    /// The MCP tool declaration.
    pub fn definition(&self) -> Tool {
        let schema = match self.input_schema() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Tool {
            name: Cow::Borrowed(self.as_str()),
            title: None,
            description: Some(Cow::Borrowed(self.description())),
            input_schema: Arc::new(schema),
            output_schema: None,
            annotations: None,
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

fn calendar_id_property() -> Value {
    json!({
        "type": "string",
        "description": "Calendar ID; defaults to the configured calendar (usually \"primary\")",
    })
}

fn event_id_property() -> Value {
    json!({ "type": "string", "description": "Event ID as shown in listings" })
}

fn send_updates_property() -> Value {
    json!({ "type": "boolean", "description": "Email attendees about the change", "default": false })
}

fn range_properties() -> Value {
    json!({
        "calendar_id": calendar_id_property(),
        "time_min": {
            "type": "string",
            "description": format!("Start of the range ({}); defaults to now", DATE_HINT),
        },
        "time_max": {
            "type": "string",
            "description": format!("End of the range ({}); defaults to 7 days after the start", DATE_HINT),
        },
        "max_results": {
            "type": "integer",
            "minimum": 1,
            "description": "Maximum number of events to return (default 25)",
        },
    })
}

fn event_properties() -> Value {
    json!({
        "summary": { "type": "string", "description": "Event title" },
        "start": { "type": "string", "description": format!("Start ({})", DATE_HINT) },
        "end": {
            "type": "string",
            "description": format!("End ({}); an all-day end date is inclusive", DATE_HINT),
        },
        "description": { "type": "string", "description": "Event description" },
        "location": { "type": "string", "description": "Event location" },
        "attendees": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Attendee email addresses",
        },
        "color_id": { "type": "string", "description": "Event color ID from list_colors" },
        "send_updates": send_updates_property(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct RangeArgs {
    calendar_id: Option<String>,
    time_min: Option<String>,
    time_max: Option<String>,
    max_results: Option<usize>,
    query: Option<String>,
}

impl RangeArgs {
    fn into_query<Tz>(self, calendar_id: &str, now: &DateTime<Tz>) -> Result<ListEventsQuery, ToolError>
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        let window = resolve_window(self.time_min.as_deref(), self.time_max.as_deref(), now)?;
        let mut query = ListEventsQuery::new(calendar_id, window);
        if let Some(max_results) = self.max_results {
            query = query.with_max_results(max_results);
        }
        if let Some(text) = self.query {
            query = query.with_text(text);
        }
        Ok(query)
    }
}

#[derive(Debug, Deserialize)]
struct EventRefArgs {
    calendar_id: Option<String>,
    event_id: String,
    #[serde(default)]
    send_updates: bool,
}

#[derive(Debug, Deserialize)]
struct CreateArgs {
    calendar_id: Option<String>,
    summary: String,
    start: String,
    end: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    attendees: Vec<String>,
    color_id: Option<String>,
    time_zone: Option<String>,
    #[serde(default)]
    recurrence: Vec<String>,
    #[serde(default)]
    send_updates: bool,
}

impl CreateArgs {
    fn into_draft<Tz>(self, now: &DateTime<Tz>) -> Result<EventDraft, ToolError>
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        let (start, end) = resolve_event_span(&self.start, self.end.as_deref(), now)?;
        let mut draft = EventDraft::new(self.summary, start, end).with_attendees(self.attendees);
        draft.description = self.description;
        draft.location = self.location;
        draft.color_id = self.color_id;
        draft.time_zone = self.time_zone;
        draft.recurrence = self.recurrence;
        draft.notify_attendees = self.send_updates;
        Ok(draft)
    }
}

#[derive(Debug, Deserialize)]
struct UpdateArgs {
    calendar_id: Option<String>,
    event_id: String,
    summary: Option<String>,
    start: Option<String>,
    end: Option<String>,
    description: Option<String>,
    location: Option<String>,
    attendees: Option<Vec<String>>,
    color_id: Option<String>,
    #[serde(default)]
    send_updates: bool,
}

impl UpdateArgs {
    fn into_patch<Tz>(self, now: &DateTime<Tz>) -> Result<EventPatch, ToolError>
    where
        Tz: TimeZone,
        Tz::Offset: Copy,
    {
        let (start, end) = match (self.start.as_deref(), self.end.as_deref()) {
            (Some(start), Some(end)) => {
                let (start, end) = resolve_event_span(start, Some(end), now)?;
                (Some(start), Some(end))
            }
            (Some(start), None) => (Some(parse_event_time(start, now)?), None),
            (None, Some(end)) => (None, Some(exclusive_end(parse_event_time(end, now)?))),
            (None, None) => (None, None),
        };

        Ok(EventPatch {
            summary: self.summary,
            description: self.description,
            location: self.location,
            start,
            end,
            attendees: self.attendees,
            color_id: self.color_id,
            notify_attendees: self.send_updates,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompleteAuthArgs {
    code: String,
}

/// All-day end dates are given inclusive and stored exclusive.
fn exclusive_end(end: EventTime) -> EventTime {
    match end {
        EventTime::AllDay(date) => EventTime::AllDay(date + Duration::days(1)),
        timed => timed,
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Map<String, Value>) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| ToolError::invalid_arguments(e.to_string()))
}

/// MCP server exposing [`CalendarService`] as tools.
#[derive(Debug, Clone)]
pub struct CalendarServer {
    service: CalendarService,
}

impl CalendarServer {
    /// Creates a server over `service`.
    pub fn new(service: CalendarService) -> Self {
        Self { service }
    }

    /// The calendar service behind the tools.
    pub fn service(&self) -> &CalendarService {
        &self.service
    }

    fn tokens(&self) -> &TokenManager {
        self.service.tokens()
    }

    /// Runs one tool, interpreting dates relative to the local clock.
    pub async fn call(&self, tool: ToolName, arguments: Map<String, Value>) -> Result<String, ToolError> {
        self.call_at(tool, arguments, &Local::now()).await
    }

    /// Runs one tool with dates relative to `now`, rendering times in `now`'s zone.
    pub async fn call_at<Tz>(
        &self,
        tool: ToolName,
        arguments: Map<String, Value>,
        now: &DateTime<Tz>,
    ) -> Result<String, ToolError>
    where
        Tz: TimeZone,
        Tz::Offset: Copy + fmt::Display,
    {
        let tz = now.timezone();
        match tool {
            ToolName::ListCalendars => {
                let calendars = self.service.list_calendars().await?;
                Ok(format::format_calendars(&calendars))
            }
            ToolName::ListEvents | ToolName::SearchEvents => {
                let args: RangeArgs = parse_args(arguments)?;
                let calendar_id = self
                    .service
                    .calendar_or_default(args.calendar_id.as_deref())
                    .to_string();
                let query = args.into_query(&calendar_id, now)?;
                debug!(calendar_id = %calendar_id, start = %query.window.start, end = %query.window.end, "listing events");
                let events = if tool == ToolName::SearchEvents {
                    self.service.search_events(&query).await?
                } else {
                    self.service.list_events(&query).await?
                };
                Ok(format::format_events(&events, &tz))
            }
            ToolName::GetEvent => {
                let args: EventRefArgs = parse_args(arguments)?;
                let calendar_id = self.service.calendar_or_default(args.calendar_id.as_deref());
                let event = self.service.get_event(calendar_id, &args.event_id).await?;
                Ok(format::format_event(&event, &tz))
            }
            ToolName::CreateEvent => {
                let args: CreateArgs = parse_args(arguments)?;
                let calendar_id = self
                    .service
                    .calendar_or_default(args.calendar_id.as_deref())
                    .to_string();
                let draft = args.into_draft(now)?;
                let event = self.service.create_event(&calendar_id, &draft).await?;
                Ok(format!("Created event.\n{}", format::format_event(&event, &tz)))
            }
            ToolName::UpdateEvent => {
                let args: UpdateArgs = parse_args(arguments)?;
                let calendar_id = self
                    .service
                    .calendar_or_default(args.calendar_id.as_deref())
                    .to_string();
                let event_id = args.event_id.clone();
                let patch = args.into_patch(now)?;
                let event = self
                    .service
                    .update_event(&calendar_id, &event_id, patch)
                    .await?;
                Ok(format!("Updated event.\n{}", format::format_event(&event, &tz)))
            }
            ToolName::DeleteEvent => {
                let args: EventRefArgs = parse_args(arguments)?;
                let calendar_id = self.service.calendar_or_default(args.calendar_id.as_deref());
                self.service
                    .delete_event(calendar_id, &args.event_id, args.send_updates)
                    .await?;
                Ok(format!("Deleted event {} from {}.", args.event_id.trim(), calendar_id))
            }
            ToolName::ListColors => {
                let palette = self.service.list_colors().await?;
                Ok(format::format_colors(&palette))
            }
            ToolName::AuthStatus => {
                if let Err(e) = self.tokens().initialize().await {
                    debug!(error = %e, "reporting status without credentials");
                }
                Ok(format::format_status(&self.tokens().status(), &tz))
            }
            ToolName::AuthUrl => {
                self.tokens().initialize().await?;
                let url = self.tokens().authorization_url()?;
                Ok(format!(
                    "Open this URL to grant Google Calendar access:\n{}\n\
                     Then call complete_auth with the code from the redirect (or the whole redirect URL).",
                    url
                ))
            }
            ToolName::CompleteAuth => {
                let args: CompleteAuthArgs = parse_args(arguments)?;
                let code = callback::extract_code(&args.code).map_err(ToolError::invalid_arguments)?;
                let grant = self.tokens().exchange_authorization_code(&code).await?;
                Ok(format!(
                    "Authorized. The access token is valid until {}.",
                    grant.expires_at().with_timezone(&tz).format("%Y-%m-%d %H:%M %:z")
                ))
            }
            ToolName::ClearAuth => {
                let report = self.tokens().clear_tokens().await?;
                Ok(format::format_clear_report(&report))
            }
        }
    }
}

impl ServerHandler for CalendarServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "gcal-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: ToolName::ALL.iter().map(ToolName::definition).collect(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let Some(tool) = ToolName::from_name(request.name.as_ref()) else {
            return Err(McpError::invalid_params(
                format!("unknown tool: {}", request.name),
                None,
            ));
        };

        info!(%tool, "tool call");
        match self.call(tool, request.arguments.unwrap_or_default()).await {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(err) => {
                warn!(%tool, error = %err, "tool call failed");
                Ok(CallToolResult::error(vec![Content::text(err.user_message())]))
            }
        }
    }
}
