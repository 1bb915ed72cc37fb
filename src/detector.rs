//! The night wander detector.
//!
//! Owns the settings snapshot, the correlator, the rollup counter, the
//! metric buffer and the task queue. Everything runs on the caller's thread:
//! events, due tasks and shutdown are handled one at a time, so none of the
//! state needs locking.
//!
//! Time is passed in explicitly as fractional epoch seconds. The agent loop
//! passes the wall clock; tests pass whatever instant they need.

use crate::adaptor::{AdaptorMessage, SensorEvent};
use crate::config::Settings;
use crate::core::{Correlator, Decision, MetricBuffer, Outcome, RollupCounter, WallClock};
use crate::outbound::{MetricSeries, OutboundSink, OutgoingMessage, SinkError};
use crate::scheduler::{next_minute, Scheduler, Task};
use crate::stats::{create_shared_stats, SharedStats};
use std::sync::Arc;

pub struct Detector {
    settings: Arc<Settings>,
    correlator: Correlator,
    rollup: RollupCounter,
    metrics: MetricBuffer,
    scheduler: Scheduler,
    sink: Box<dyn OutboundSink>,
    stats: SharedStats,
}

impl Detector {
    pub fn new(
        settings: Arc<Settings>,
        rollup: RollupCounter,
        sink: Box<dyn OutboundSink>,
    ) -> Self {
        Self {
            correlator: Correlator::new(settings.policy),
            settings,
            rollup,
            metrics: MetricBuffer::new(),
            scheduler: Scheduler::new(),
            sink,
            stats: create_shared_stats(),
        }
    }

    /// Share counters with other parts of the process.
    pub fn with_stats(mut self, stats: SharedStats) -> Self {
        self.stats = stats;
        self
    }

    /// Restore the rollup count and start the minute tick.
    pub fn start(&mut self, now: f64) {
        let restored = self.rollup.restore();
        tracing::debug!("Starting with wander count {restored}");
        self.scheduler.schedule_at(next_minute(now), Task::MinuteTick);
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn stats(&self) -> &SharedStats {
        &self.stats
    }

    pub fn wander_count(&self) -> u64 {
        self.rollup.count()
    }

    /// Sensors recorded since the last alert or session close.
    pub fn activated_sensors(&self) -> &[String] {
        self.correlator.activated()
    }

    pub fn pending_metrics(&self) -> usize {
        self.metrics.len()
    }

    /// Epoch seconds of the next scheduled task.
    pub fn next_deadline(&self) -> Option<f64> {
        self.scheduler.next_due()
    }

    /// Replace the settings snapshot.
    ///
    /// Switching correlation policy drops the open session; its pending
    /// timeout will find a stale ticket and do nothing.
    pub fn apply_settings(&mut self, settings: Arc<Settings>) {
        if self.correlator.set_policy(settings.policy) {
            tracing::info!("Correlation policy is now {}", settings.policy);
        }
        self.settings = settings;
    }

    /// Handle a raw adaptor message.
    pub fn handle_message(&mut self, message: &AdaptorMessage, now: f64) {
        self.stats.record_event();
        match self.settings.registry.to_event(message) {
            Some(event) => self.process(&event, now),
            None => tracing::trace!(
                "Ignoring {} reading {:?} from {}",
                message.characteristic,
                message.data,
                message.sensor_id
            ),
        }
    }

    /// Handle a binary sensor event.
    pub fn handle_event(&mut self, event: &SensorEvent, now: f64) {
        self.stats.record_event();
        self.process(event, now);
    }

    fn process(&mut self, event: &SensorEvent, now: f64) {
        tracing::debug!(
            "Sensor {} is {:?} at {}",
            event.sensor_id,
            event.value,
            event.timestamp
        );

        let settings = Arc::clone(&self.settings);
        match self.correlator.on_sensor_event(event, &settings) {
            Ok(Decision::Triggered {
                label,
                metric,
                outcome,
            }) => {
                tracing::debug!("Night trigger from {label}");
                self.stats.record_in_window();
                match metric {
                    Some(point) => {
                        self.stats.record_metric_sample();
                        if self.metrics.store(point) {
                            self.scheduler.schedule_after(
                                now,
                                settings.data_send_delay_secs,
                                Task::FlushMetrics,
                            );
                        }
                    }
                    None => tracing::warn!(
                        "Clock not set ({}), not recording a sample for {label}",
                        event.timestamp
                    ),
                }
                self.apply_outcome(outcome, now);
            }
            Ok(Decision::NotOn) | Ok(Decision::OutsideWindow) => {}
            Err(e) => {
                self.stats.record_config_error();
                tracing::error!("Dropping event from {}: {e}", event.sensor_id);
            }
        }
    }

    fn apply_outcome(&mut self, outcome: Outcome, now: f64) {
        if outcome.wander_event {
            self.rollup.record_wander_event();
            self.stats.record_wander_event();
        }
        if let Some(ticket) = outcome.open_session {
            self.scheduler.schedule_after(
                now,
                self.settings.debounce_secs,
                Task::CloseSession(ticket),
            );
        }
        if let Some(alert) = outcome.alert {
            let text = alert.text(&self.settings.clock);
            tracing::info!("{text}");
            if self.emit(OutgoingMessage::alert(text, alert.timestamp)) {
                self.stats.record_alert();
            }
        }
    }

    /// Run every task due at or before `now`. Returns how many ran.
    pub fn run_due(&mut self, now: f64) -> usize {
        let mut ran = 0;
        while let Some(task) = self.scheduler.pop_due(now) {
            ran += 1;
            match task {
                Task::CloseSession(ticket) => {
                    let outcome = self.correlator.on_timeout(ticket);
                    self.apply_outcome(outcome, now);
                }
                Task::FlushMetrics => self.flush_metrics(),
                Task::MinuteTick => {
                    self.minute_tick(now);
                    self.scheduler.schedule_at(next_minute(now), Task::MinuteTick);
                }
            }
        }
        ran
    }

    /// Check whether the nightly rollup is due and send it.
    pub fn minute_tick(&mut self, now: f64) {
        let settings = Arc::clone(&self.settings);
        let Some(window) = settings.window.as_ref() else {
            return;
        };
        if let Some(points) =
            self.rollup
                .flush_if_window_end_now(now, window, &settings.clock, &settings.bridge_id)
        {
            tracing::info!(
                "Night {window} ended at {}, reporting rollup",
                settings.clock.format(now)
            );
            let series = points.into_iter().map(MetricSeries::from).collect();
            if self.emit(OutgoingMessage::data(series)) {
                self.stats.record_rollup_flush();
            }
        }
    }

    fn flush_metrics(&mut self) {
        if let Some(message) = self.metrics.take_message() {
            self.emit(message);
        }
    }

    /// Validate and deliver a message. Failures are logged, never raised.
    fn emit(&mut self, message: OutgoingMessage) -> bool {
        let result = message
            .validate()
            .map_err(SinkError::from)
            .and_then(|()| self.sink.send(&message));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not deliver message: {e}");
                self.stats.record_delivery_failure();
                false
            }
        }
    }

    /// Flush buffered metrics and persist the rollup count.
    pub fn shutdown(&mut self) {
        self.flush_metrics();
        match self.rollup.persist() {
            Ok(()) => tracing::info!(
                "Saved wander count {} to {:?}",
                self.rollup.count(),
                self.rollup.store().path()
            ),
            Err(e) => tracing::warn!("Could not save wander count: {e}"),
        }
    }

    pub fn clock(&self) -> WallClock {
        self.settings.clock
    }
}
