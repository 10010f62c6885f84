use serde::Serialize;
use serde_json::{Map, Value};

/// Envelope field holding the device sampling instant.
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// Envelope field holding the originating device identifier.
pub const FIELD_HARDWARE_ID: &str = "hardwareId";
/// Envelope field holding the tag → value mapping.
pub const FIELD_READINGS: &str = "readings";

/// One multi-tag telemetry snapshot published by a field device.
///
/// Fields are already defaulted: a missing timestamp is `0`, a missing
/// hardware id is empty, missing readings are an empty map. Reading values
/// are kept as raw JSON so each tag can be coerced on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEnvelope {
    /// Epoch time of the sampling instant on the device.
    pub timestamp: i64,

    /// Stable identifier of the originating device.
    pub hardware_id: String,

    /// Tag name → raw reading value.
    pub readings: Map<String, Value>,
}

impl RawEnvelope {
    /// Number of tags carried by this envelope.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// Whether the envelope carries no readings at all.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// A single tag value ready for cloud ingestion.
///
/// Serializes to the ingestion wire shape
/// `{"timestamp", "tagName", "value", "deviceName", "deviceID"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMeasurement {
    /// Copied from the envelope that produced this measurement.
    pub timestamp: i64,

    /// The reading's key.
    #[serde(rename = "tagName")]
    pub tag_name: String,

    /// The reading's value.
    pub value: f64,

    /// Fixed label for the logical device class.
    #[serde(rename = "deviceName")]
    pub device_name: String,

    /// Copied from the envelope's hardware id.
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

impl NormalizedMeasurement {
    /// Serialize to the JSON bytes sent to the cloud endpoint.
    pub fn to_json_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_wire_keys() {
        let measurement = NormalizedMeasurement {
            timestamp: 1_700_000_000,
            tag_name: "voltage".to_string(),
            value: 230.5,
            device_name: "Socomech".to_string(),
            device_id: "HW-42".to_string(),
        };

        let json: Value = serde_json::from_slice(&measurement.to_json_bytes().unwrap()).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 5);
        assert_eq!(json["timestamp"], 1_700_000_000);
        assert_eq!(json["tagName"], "voltage");
        assert_eq!(json["value"], 230.5);
        assert_eq!(json["deviceName"], "Socomech");
        assert_eq!(json["deviceID"], "HW-42");
    }

    #[test]
    fn test_integral_value_serializes_as_float() {
        let measurement = NormalizedMeasurement {
            timestamp: 0,
            tag_name: "current".to_string(),
            value: 20.0,
            device_name: "Socomech".to_string(),
            device_id: String::new(),
        };

        let text = String::from_utf8(measurement.to_json_bytes().unwrap()).unwrap();
        assert!(text.contains("\"value\":20.0"));
    }

    #[test]
    fn test_envelope_len() {
        let mut envelope = RawEnvelope::default();
        assert!(envelope.is_empty());

        envelope
            .readings
            .insert("v1".to_string(), Value::from(10.5));
        assert_eq!(envelope.len(), 1);
    }
}
