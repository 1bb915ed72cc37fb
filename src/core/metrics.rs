//! Metric points and the coalescing outbound buffer.
//!
//! The first point stored after an idle period asks the caller to schedule a
//! flush; points added before that flush runs ride along in the same message.

use crate::outbound::{MetricSeries, OutgoingMessage};

/// Namespace segment shared by every series this agent reports.
pub const SERIES_NAMESPACE: &str = "Night_Wander";

/// `"<bridge>/Night_Wander/<name>"`
pub fn series_name(bridge_id: &str, name: &str) -> String {
    format!("{bridge_id}/{SERIES_NAMESPACE}/{name}")
}

/// A single time series sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub series: String,
    pub epoch_ms: i64,
    pub value: f64,
}

impl MetricPoint {
    pub fn new(bridge_id: &str, name: &str, timestamp: f64, value: f64) -> Self {
        Self {
            series: series_name(bridge_id, name),
            epoch_ms: (timestamp * 1000.0) as i64,
            value,
        }
    }
}

impl From<MetricPoint> for MetricSeries {
    fn from(point: MetricPoint) -> Self {
        MetricSeries {
            series: point.series,
            samples: vec![(point.epoch_ms, point.value)],
        }
    }
}

/// Buffers metric points until the scheduled flush.
#[derive(Debug, Default)]
pub struct MetricBuffer {
    pending: Vec<MetricPoint>,
    waiting: bool,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a point. Returns true when the caller must schedule a flush.
    pub fn store(&mut self, point: MetricPoint) -> bool {
        self.pending.push(point);
        if self.waiting {
            false
        } else {
            self.waiting = true;
            true
        }
    }

    /// Drain the buffer into one data message.
    pub fn take_message(&mut self) -> Option<OutgoingMessage> {
        self.waiting = false;
        if self.pending.is_empty() {
            return None;
        }
        let points = std::mem::take(&mut self.pending)
            .into_iter()
            .map(MetricSeries::from)
            .collect();
        Some(OutgoingMessage::data(points))
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_name() {
        assert_eq!(series_name("BID7", "Kitchen"), "BID7/Night_Wander/Kitchen");
    }

    #[test]
    fn test_first_point_schedules_flush() {
        let mut buffer = MetricBuffer::new();
        assert!(buffer.store(MetricPoint::new("B", "Hall", 100.0, 1.0)));
        assert!(!buffer.store(MetricPoint::new("B", "Door", 101.0, 1.0)));
        assert_eq!(buffer.len(), 2);

        match buffer.take_message() {
            Some(OutgoingMessage::Data { points }) => {
                assert_eq!(points.len(), 2);
                assert_eq!(points[0].series, "B/Night_Wander/Hall");
                assert_eq!(points[0].samples, vec![(100_000, 1.0)]);
            }
            other => panic!("expected data message, got {other:?}"),
        }

        assert!(!buffer.is_waiting());
        assert!(buffer.store(MetricPoint::new("B", "Hall", 200.0, 1.0)));
    }

    #[test]
    fn test_empty_flush() {
        let mut buffer = MetricBuffer::new();
        assert!(buffer.take_message().is_none());
    }
}
