//! Sensor event correlation.
//!
//! Every "on" event inside the night window is recorded as a metric sample
//! and then handed to the configured [`CorrelationPolicy`], which decides
//! when a burst of triggers becomes one alert.
//!
//! Two policies exist:
//!
//! - [`CooldownPolicy`]: alert on the first trigger, then stay quiet until
//!   the debounce interval has passed since the last alert. Sensors that fire
//!   during the quiet period are named in the next alert.
//! - [`SessionPolicy`]: the first trigger opens a session and schedules its
//!   close. When the session closes, one alert names every sensor seen, but
//!   only if more than one sensor fired.
//!
//! Session timeouts are never cancelled. Each one carries a
//! [`SessionTicket`] and is ignored unless it still matches the open session.

use crate::adaptor::SensorEvent;
use crate::config::Settings;
use crate::core::metrics::MetricPoint;
use crate::core::window::WallClock;
use serde::{Deserialize, Serialize};

/// Which correlation policy is in force.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    /// Immediate alert, then suppressed for the debounce interval
    Cooldown,
    /// Deferred alert aggregating a whole debounce window
    #[default]
    Session,
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyKind::Cooldown => write!(f, "cooldown"),
            PolicyKind::Session => write!(f, "session"),
        }
    }
}

/// Identifies one correlation session across policy replacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionTicket {
    pub epoch: u64,
    pub generation: u64,
}

/// An aggregated alert naming every implicated sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub sensors: Vec<String>,
    pub timestamp: f64,
}

impl Alert {
    pub fn text(&self, clock: &WallClock) -> String {
        format!(
            "Night wandering detected by {} at {}",
            self.sensors.join(", "),
            clock.format(self.timestamp)
        )
    }
}

/// What a policy wants done after a trigger or timeout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// Alert to send now
    pub alert: Option<Alert>,
    /// Count one wandering episode in the nightly rollup
    pub wander_event: bool,
    /// A session was opened; schedule its close after the debounce interval
    pub open_session: Option<SessionTicket>,
}

/// A correlation strategy.
pub trait CorrelationPolicy: std::fmt::Debug {
    fn kind(&self) -> PolicyKind;

    /// Handle an in-window "on" trigger from the sensor labelled `label`.
    fn on_trigger(&mut self, label: &str, timestamp: f64, debounce_secs: f64) -> Outcome;

    /// Handle a session timeout. Stale tickets must be a no-op.
    fn on_timeout(&mut self, ticket: SessionTicket) -> Outcome;

    /// Sensors recorded since the last alert or session close.
    fn activated(&self) -> &[String];
}

/// Alert immediately, then suppress until the debounce interval elapses.
///
/// The activated set is only cleared when an alert fires, so sensors that
/// trigger during the quiet period are carried into the next alert however
/// long that takes.
#[derive(Debug, Default)]
pub struct CooldownPolicy {
    last_alert: f64,
    activated: Vec<String>,
}

impl CooldownPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CorrelationPolicy for CooldownPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Cooldown
    }

    fn on_trigger(&mut self, label: &str, timestamp: f64, debounce_secs: f64) -> Outcome {
        if !self.activated.iter().any(|s| s == label) {
            self.activated.push(label.to_string());
        }
        if timestamp - self.last_alert <= debounce_secs {
            return Outcome::default();
        }

        self.last_alert = timestamp;
        Outcome {
            alert: Some(Alert {
                sensors: std::mem::take(&mut self.activated),
                timestamp,
            }),
            wander_event: true,
            open_session: None,
        }
    }

    fn on_timeout(&mut self, _ticket: SessionTicket) -> Outcome {
        Outcome::default()
    }

    fn activated(&self) -> &[String] {
        &self.activated
    }
}

/// Aggregate a debounce window into one session.
#[derive(Debug)]
pub struct SessionPolicy {
    epoch: u64,
    generation: u64,
    opened_at: Option<f64>,
    activated: Vec<String>,
}

impl SessionPolicy {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            generation: 0,
            opened_at: None,
            activated: Vec::new(),
        }
    }

    /// Ticket of the currently open session, if any.
    pub fn open_ticket(&self) -> Option<SessionTicket> {
        self.opened_at.map(|_| SessionTicket {
            epoch: self.epoch,
            generation: self.generation,
        })
    }
}

impl CorrelationPolicy for SessionPolicy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Session
    }

    fn on_trigger(&mut self, label: &str, timestamp: f64, _debounce_secs: f64) -> Outcome {
        if self.activated.iter().any(|s| s == label) {
            return Outcome::default();
        }
        self.activated.push(label.to_string());
        if self.activated.len() > 1 {
            return Outcome::default();
        }

        self.generation += 1;
        self.opened_at = Some(timestamp);
        Outcome {
            alert: None,
            wander_event: true,
            open_session: self.open_ticket(),
        }
    }

    fn on_timeout(&mut self, ticket: SessionTicket) -> Outcome {
        if self.open_ticket() != Some(ticket) {
            return Outcome::default();
        }

        let sensors = std::mem::take(&mut self.activated);
        let opened_at = self.opened_at.take().unwrap_or_default();
        if sensors.len() < 2 {
            return Outcome::default();
        }
        Outcome {
            alert: Some(Alert {
                sensors,
                timestamp: opened_at,
            }),
            wander_event: false,
            open_session: None,
        }
    }

    fn activated(&self) -> &[String] {
        &self.activated
    }
}

fn build_policy(kind: PolicyKind, epoch: u64) -> Box<dyn CorrelationPolicy> {
    match kind {
        PolicyKind::Cooldown => Box::new(CooldownPolicy::new()),
        PolicyKind::Session => Box::new(SessionPolicy::new(epoch)),
    }
}

/// Result of feeding one sensor event to the correlator.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Not an "on" transition
    NotOn,
    /// Outside the night window; nothing recorded
    OutsideWindow,
    /// Counted as a trigger
    Triggered {
        label: String,
        /// `None` when the clock is not yet plausible
        metric: Option<MetricPoint>,
        outcome: Outcome,
    },
}

/// Reasons an event is dropped without touching correlation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The night window is missing or invalid
    NoNightWindow,
    /// The sensor is not in the identifier map
    UnknownSensor(String),
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventError::NoNightWindow => write!(f, "No valid night window configured"),
            EventError::UnknownSensor(id) => write!(f, "Unknown sensor id: {id}"),
        }
    }
}

impl std::error::Error for EventError {}

/// Runs the window test and label lookup, then delegates to the policy.
#[derive(Debug)]
pub struct Correlator {
    policy: Box<dyn CorrelationPolicy>,
    epoch: u64,
}

impl Correlator {
    pub fn new(kind: PolicyKind) -> Self {
        Self {
            policy: build_policy(kind, 0),
            epoch: 0,
        }
    }

    pub fn kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    /// Switch policy. Open state is dropped and outstanding tickets go stale.
    /// Returns false if `kind` is already in force.
    pub fn set_policy(&mut self, kind: PolicyKind) -> bool {
        if kind == self.policy.kind() {
            return false;
        }
        self.epoch += 1;
        self.policy = build_policy(kind, self.epoch);
        true
    }

    pub fn on_sensor_event(
        &mut self,
        event: &SensorEvent,
        settings: &Settings,
    ) -> Result<Decision, EventError> {
        if !event.value.is_on() {
            return Ok(Decision::NotOn);
        }

        let window = settings.window.as_ref().ok_or(EventError::NoNightWindow)?;
        if !settings.clock.contains(window, event.timestamp) {
            return Ok(Decision::OutsideWindow);
        }

        let label = settings
            .registry
            .label(&event.sensor_id)
            .ok_or_else(|| EventError::UnknownSensor(event.sensor_id.clone()))?
            .to_string();

        let metric = if event.timestamp >= settings.min_valid_timestamp {
            Some(MetricPoint::new(
                &settings.bridge_id,
                &label,
                event.timestamp,
                1.0,
            ))
        } else {
            None
        };

        let outcome = self
            .policy
            .on_trigger(&label, event.timestamp, settings.debounce_secs);

        Ok(Decision::Triggered {
            label,
            metric,
            outcome,
        })
    }

    pub fn on_timeout(&mut self, ticket: SessionTicket) -> Outcome {
        self.policy.on_timeout(ticket)
    }

    pub fn activated(&self) -> &[String] {
        self.policy.activated()
    }
}
