//! Core types: event times, date parsing, tracing setup

pub mod time;
pub mod tracing;

pub use time::{
    EventTime, TimeParseError, TimeWindow, parse_event_time, resolve_event_span, resolve_window,
};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
