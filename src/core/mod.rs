//! Core detection logic.
//!
//! This module contains:
//! - The night window membership test
//! - Sensor event correlation into alerts
//! - The nightly rollup counter
//! - The coalescing metric buffer

pub mod correlator;
pub mod metrics;
pub mod rollup;
pub mod window;

// Re-export commonly used types
pub use correlator::{
    Alert, CooldownPolicy, CorrelationPolicy, Correlator, Decision, EventError, Outcome,
    PolicyKind, SessionPolicy, SessionTicket,
};
pub use metrics::{series_name, MetricBuffer, MetricPoint};
pub use rollup::{RollupCounter, RollupError, RollupStore};
pub use window::{is_within_night_window, NightWindow, WallClock, WindowError};
