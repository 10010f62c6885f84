//! Decomposition of a raw envelope into one measurement per tag.
//!
//! Everything here is pure: no I/O, no logging. Callers decide what to log
//! from the returned [`Normalized`] report.

use serde_json::{Map, Value};
use thiserror::Error;
use twinbridge_common::telemetry::{FIELD_HARDWARE_ID, FIELD_READINGS, FIELD_TIMESTAMP};
use twinbridge_common::{NormalizedMeasurement, RawEnvelope};

/// The payload could not be treated as an envelope at all.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Envelope must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Why a single reading was left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The value is not a number or a numeric string.
    NotNumeric(&'static str),
    /// The value parsed but is NaN or infinite.
    NotFinite,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotNumeric(kind) => write!(f, "{} is not numeric", kind),
            SkipReason::NotFinite => write!(f, "value is not finite"),
        }
    }
}

/// A reading dropped during normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedReading {
    pub tag_name: String,
    pub reason: SkipReason,
}

/// Result of normalizing one envelope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub measurements: Vec<NormalizedMeasurement>,
    pub skipped: Vec<SkippedReading>,
}

impl IntoIterator for Normalized {
    type Item = NormalizedMeasurement;
    type IntoIter = std::vec::IntoIter<NormalizedMeasurement>;

    fn into_iter(self) -> Self::IntoIter {
        self.measurements.into_iter()
    }
}

/// Turns raw payloads into normalized measurements for a fixed device class.
#[derive(Debug, Clone)]
pub struct Normalizer {
    device_name: String,
}

impl Normalizer {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Parse `payload` and expand it into measurements.
    pub fn normalize(&self, payload: &[u8]) -> Result<Normalized, ParseError> {
        Ok(self.expand(parse_envelope(payload)?))
    }

    /// Expand an already-parsed envelope. Tags come out in key order.
    pub fn expand(&self, envelope: RawEnvelope) -> Normalized {
        let mut normalized = Normalized::default();

        for (tag_name, raw) in envelope.readings {
            match coerce_value(&raw) {
                Ok(value) => normalized.measurements.push(NormalizedMeasurement {
                    timestamp: envelope.timestamp,
                    tag_name,
                    value,
                    device_name: self.device_name.clone(),
                    device_id: envelope.hardware_id.clone(),
                }),
                Err(reason) => normalized.skipped.push(SkippedReading { tag_name, reason }),
            }
        }

        normalized
    }
}

/// Parse a payload into a [`RawEnvelope`], defaulting missing or mistyped fields.
pub fn parse_envelope(payload: &[u8]) -> Result<RawEnvelope, ParseError> {
    let mut root = match serde_json::from_slice::<Value>(payload)? {
        Value::Object(root) => root,
        other => return Err(ParseError::NotAnObject(kind_of(&other))),
    };

    let timestamp = root.get(FIELD_TIMESTAMP).map(coerce_timestamp).unwrap_or(0);
    let hardware_id = root
        .get(FIELD_HARDWARE_ID)
        .map(coerce_text)
        .unwrap_or_default();
    let readings = match root.remove(FIELD_READINGS) {
        Some(Value::Object(readings)) => readings,
        _ => Map::new(),
    };

    Ok(RawEnvelope {
        timestamp,
        hardware_id,
        readings,
    })
}

/// Integers pass through, floats truncate, numeric strings parse; anything else is 0.
fn coerce_timestamp(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f as i64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn coerce_value(value: &Value) -> Result<f64, SkipReason> {
    let parsed = match value {
        Value::Number(n) => n.as_f64().ok_or(SkipReason::NotFinite)?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| SkipReason::NotNumeric("string"))?,
        other => return Err(SkipReason::NotNumeric(kind_of(other))),
    };

    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(SkipReason::NotFinite)
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
