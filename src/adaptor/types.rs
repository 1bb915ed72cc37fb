//! Inbound event types from the device adaptors.
//!
//! Adaptors report raw characteristic readings. Only `binary_sensor` readings
//! reach the detector, after the per-sensor inverted-logic mapping has been
//! applied here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Characteristic name carried by motion and door sensors.
pub const BINARY_SENSOR: &str = "binary_sensor";

/// A raw reading as delivered by a device adaptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptorMessage {
    /// Adaptor identifier of the physical sensor
    #[serde(rename = "sensorId", alias = "id")]
    pub sensor_id: String,
    /// Epoch seconds, fractional
    #[serde(alias = "timeStamp")]
    pub timestamp: f64,
    /// Characteristic the reading belongs to
    pub characteristic: String,
    /// Raw value, `"on"` or `"off"` for binary sensors
    pub data: String,
}

impl AdaptorMessage {
    pub fn binary(sensor_id: impl Into<String>, timestamp: f64, data: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            characteristic: BINARY_SENSOR.to_string(),
            data: data.into(),
        }
    }
}

/// Binary sensor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryValue {
    On,
    Off,
}

impl BinaryValue {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            s if s.eq_ignore_ascii_case("on") => Some(BinaryValue::On),
            s if s.eq_ignore_ascii_case("off") => Some(BinaryValue::Off),
            _ => None,
        }
    }

    pub fn inverted(self) -> Self {
        match self {
            BinaryValue::On => BinaryValue::Off,
            BinaryValue::Off => BinaryValue::On,
        }
    }

    pub fn is_on(self) -> bool {
        self == BinaryValue::On
    }
}

/// A binary sensor transition ready for the detector.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEvent {
    pub sensor_id: String,
    pub timestamp: f64,
    pub value: BinaryValue,
}

impl SensorEvent {
    pub fn new(sensor_id: impl Into<String>, timestamp: f64, value: BinaryValue) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            value,
        }
    }

    pub fn on(sensor_id: impl Into<String>, timestamp: f64) -> Self {
        Self::new(sensor_id, timestamp, BinaryValue::On)
    }
}

/// Per-sensor configuration supplied with the device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Friendly name shown in alerts
    pub name: String,
    /// Whether the sensor reports "off" when it is triggered
    #[serde(default)]
    pub inverted: bool,
}

impl SensorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inverted: false,
        }
    }

    pub fn inverted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inverted: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SensorEntry {
    label: String,
    inverted: bool,
}

/// Read-only identifier to label map.
///
/// Rebuilt as a whole whenever the configuration changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorRegistry {
    sensors: HashMap<String, SensorEntry>,
}

impl SensorRegistry {
    pub fn from_config(sensors: &BTreeMap<String, SensorConfig>) -> Self {
        let sensors = sensors
            .iter()
            .map(|(id, cfg)| {
                (
                    id.clone(),
                    SensorEntry {
                        label: cfg.name.replace(' ', "_"),
                        inverted: cfg.inverted,
                    },
                )
            })
            .collect();
        Self { sensors }
    }

    /// Display label for a sensor, spaces replaced by underscores.
    pub fn label(&self, sensor_id: &str) -> Option<&str> {
        self.sensors.get(sensor_id).map(|e| e.label.as_str())
    }

    pub fn is_inverted(&self, sensor_id: &str) -> bool {
        self.sensors
            .get(sensor_id)
            .map(|e| e.inverted)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Turn an adaptor reading into a sensor event.
    ///
    /// Returns `None` for other characteristics and unparsable values.
    /// Unknown sensors pass through unmapped; the detector reports them.
    pub fn to_event(&self, message: &AdaptorMessage) -> Option<SensorEvent> {
        if message.characteristic != BINARY_SENSOR {
            return None;
        }
        let raw = BinaryValue::parse(&message.data)?;
        let value = if self.is_inverted(&message.sensor_id) {
            raw.inverted()
        } else {
            raw
        };
        Some(SensorEvent::new(
            message.sensor_id.clone(),
            message.timestamp,
            value,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SensorRegistry {
        let mut sensors = BTreeMap::new();
        sensors.insert("ADT1".to_string(), SensorConfig::new("Hall PIR"));
        sensors.insert("ADT2".to_string(), SensorConfig::inverted("Front Door"));
        SensorRegistry::from_config(&sensors)
    }

    #[test]
    fn test_labels_replace_spaces() {
        let registry = registry();
        assert_eq!(registry.label("ADT1"), Some("Hall_PIR"));
        assert_eq!(registry.label("ADT2"), Some("Front_Door"));
        assert_eq!(registry.label("ADT9"), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_inverted_mapping() {
        let registry = registry();
        let event = registry
            .to_event(&AdaptorMessage::binary("ADT2", 10.0, "off"))
            .unwrap();
        assert_eq!(event.value, BinaryValue::On);

        let event = registry
            .to_event(&AdaptorMessage::binary("ADT1", 10.0, "off"))
            .unwrap();
        assert_eq!(event.value, BinaryValue::Off);
    }

    #[test]
    fn test_other_characteristics_ignored() {
        let registry = registry();
        let mut message = AdaptorMessage::binary("ADT1", 10.0, "on");
        message.characteristic = "temperature".to_string();
        assert!(registry.to_event(&message).is_none());

        let message = AdaptorMessage::binary("ADT1", 10.0, "21.5");
        assert!(registry.to_event(&message).is_none());
    }

    #[test]
    fn test_message_field_aliases() {
        let original: AdaptorMessage = serde_json::from_str(
            r#"{"id": "ADT1", "timeStamp": 1700000000.5, "characteristic": "binary_sensor", "data": "on"}"#,
        )
        .unwrap();
        let current: AdaptorMessage = serde_json::from_str(
            r#"{"sensorId": "ADT1", "timestamp": 1700000000.5, "characteristic": "binary_sensor", "data": "on"}"#,
        )
        .unwrap();
        assert_eq!(original, current);
    }
}
