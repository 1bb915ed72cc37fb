//! Device adaptor boundary.
//!
//! Readings arrive from the adaptors as JSON; this module maps them onto
//! binary sensor events and feeds them to the agent loop.

pub mod source;
pub mod types;

pub use source::{parse_line, EventSource, SourceError};
pub use types::{
    AdaptorMessage, BinaryValue, SensorConfig, SensorEvent, SensorRegistry, BINARY_SENSOR,
};
