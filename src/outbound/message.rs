//! Messages delivered to the remote collector.

use serde::{Deserialize, Serialize};

/// One metric series with its samples as `(epoch_ms, value)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub series: String,
    pub samples: Vec<(i64, f64)>,
}

/// An outgoing message: either an alert or a batch of metric series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutgoingMessage {
    Alert { text: String, timestamp: f64 },
    Data { points: Vec<MetricSeries> },
}

impl OutgoingMessage {
    pub fn alert(text: impl Into<String>, timestamp: f64) -> Self {
        OutgoingMessage::Alert {
            text: text.into(),
            timestamp,
        }
    }

    pub fn data(points: Vec<MetricSeries>) -> Self {
        OutgoingMessage::Data { points }
    }

    pub fn is_alert(&self) -> bool {
        matches!(self, OutgoingMessage::Alert { .. })
    }

    /// Check the message before it is handed to a sink.
    pub fn validate(&self) -> Result<(), MessageError> {
        match self {
            OutgoingMessage::Alert { text, timestamp } => {
                if text.trim().is_empty() {
                    return Err(MessageError::EmptyAlert);
                }
                if !timestamp.is_finite() {
                    return Err(MessageError::NonFinite("alert timestamp".to_string()));
                }
            }
            OutgoingMessage::Data { points } => {
                if points.is_empty() {
                    return Err(MessageError::EmptyBatch);
                }
                for point in points {
                    if point.series.is_empty() {
                        return Err(MessageError::UnnamedSeries);
                    }
                    if point.samples.is_empty() {
                        return Err(MessageError::NoSamples(point.series.clone()));
                    }
                    if point.samples.iter().any(|(_, v)| !v.is_finite()) {
                        return Err(MessageError::NonFinite(point.series.clone()));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Reasons a message is rejected at the sink boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    EmptyAlert,
    EmptyBatch,
    UnnamedSeries,
    NoSamples(String),
    NonFinite(String),
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::EmptyAlert => write!(f, "alert has no text"),
            MessageError::EmptyBatch => write!(f, "data message has no points"),
            MessageError::UnnamedSeries => write!(f, "metric series has no name"),
            MessageError::NoSamples(series) => write!(f, "series {series} has no samples"),
            MessageError::NonFinite(what) => write!(f, "non-finite value in {what}"),
        }
    }
}

impl std::error::Error for MessageError {}
