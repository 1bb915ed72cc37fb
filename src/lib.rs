//! Night Wander - night-time wandering detector for care monitoring.
//!
//! Watches binary motion and door sensors and raises an alert when
//! somebody is up and about during a configured night window.
//!
//! # What it does
//!
//! - **Window test**: decides whether an event falls inside a night window
//!   that may cross midnight, in host local time or a configured zone
//! - **Correlation**: turns bursts of triggers into one alert, using either
//!   a cooldown or a session policy
//! - **Rollup**: counts wandering episodes per night and reports the count
//!   at the end of each window, surviving restarts
//! - **Metrics**: records every in-window trigger as a coalesced time-series
//!   sample
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Night Wander                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Adaptor   │──▶│ Correlator  │──▶│   Outbound  │         │
//! │  │ (JSON/HTTP) │   │  (window +  │   │    (sink)   │         │
//! │  └─────────────┘   │   policy)   │   └─────────────┘         │
//! │                    └─────────────┘          ▲                │
//! │                      │         │            │                │
//! │                      ▼         ▼            │                │
//! │               ┌──────────┐ ┌──────────┐     │                │
//! │               │  Rollup  │ │ Metrics  │─────┘                │
//! │               └──────────┘ └──────────┘                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use night_wander::{Config, Detector, JsonLinesSink, RollupCounter, RollupStore, Settings};
//! use std::sync::Arc;
//!
//! let config = Config::load().unwrap_or_default();
//! let settings = Arc::new(Settings::from_config(&config));
//! let store = RollupStore::for_instance(&settings.data_path, &settings.instance_id);
//!
//! let mut detector = Detector::new(
//!     settings,
//!     RollupCounter::new(store),
//!     Box::new(JsonLinesSink::stdout()),
//! );
//! detector.start(chrono::Utc::now().timestamp() as f64);
//! ```

pub mod adaptor;
pub mod config;
pub mod core;
pub mod detector;
pub mod outbound;
pub mod scheduler;
pub mod stats;

#[cfg(feature = "gateway")]
pub mod gateway;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use adaptor::{AdaptorMessage, EventSource, SensorConfig, SensorEvent, SensorRegistry};
pub use config::{Config, ConfigError, Settings};
pub use core::{
    is_within_night_window, NightWindow, PolicyKind, RollupCounter, RollupStore, WallClock,
};
pub use detector::Detector;
pub use outbound::{JsonLinesSink, MemorySink, OutboundSink, OutgoingMessage, SinkError};
pub use stats::{create_shared_stats, DetectorStats, SharedStats, StatsSnapshot};

// Gateway re-exports (when enabled)
#[cfg(feature = "gateway")]
pub use gateway::{BlockingGatewayClient, GatewayClient, GatewayConfig, GatewayError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
