//! Outbound delivery of alerts and metric batches.
//!
//! The detector never talks to a transport directly. It builds typed
//! [`OutgoingMessage`]s, validates them, and hands them to an
//! [`OutboundSink`].

pub mod message;
pub mod sink;

pub use message::{MessageError, MetricSeries, OutgoingMessage};
pub use sink::{JsonLinesSink, MemorySink, OutboundSink, SinkError};
