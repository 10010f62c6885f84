//! Integration tests for twinbridge-common library.

use serde::Deserialize;
use serde_json::Value;
use twinbridge_common::{LogFormat, LoggingConfig, NormalizedMeasurement, ZenohConfig};

#[derive(Debug, Deserialize)]
struct BridgeSections {
    zenoh: ZenohConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
fn test_config_sections_roundtrip_into_zenoh() {
    let config: BridgeSections = json5::from_str(
        r#"{
            // comments and trailing commas are fine in JSON5
            zenoh: { mode: "client", connect: ["tcp/10.0.0.5:7447"], },
            logging: { level: "warn", format: "json" },
        }"#,
    )
    .expect("config should parse");

    assert_eq!(config.logging.format, LogFormat::Json);
    assert!(config.zenoh.to_zenoh_config().is_ok());
}

#[test]
fn test_measurement_batch_shares_device_fields() {
    let tags = [("voltage", 230.1), ("current", 12.0), ("frequency", 50.02)];

    let batch: Vec<NormalizedMeasurement> = tags
        .iter()
        .map(|(tag, value)| NormalizedMeasurement {
            timestamp: 1_717_171_717,
            tag_name: tag.to_string(),
            value: *value,
            device_name: "Socomech".to_string(),
            device_id: "gw-7".to_string(),
        })
        .collect();

    for measurement in &batch {
        let bytes = measurement.to_json_bytes().expect("encode failed");
        let decoded: Value = serde_json::from_slice(&bytes).expect("decode failed");
        assert_eq!(decoded["tagName"], measurement.tag_name.as_str());
        assert_eq!(decoded["value"], measurement.value);
        assert_eq!(decoded["deviceID"], "gw-7");
        assert_eq!(decoded["timestamp"], 1_717_171_717);
    }
}

#[test]
fn test_unknown_zenoh_mode_rejected() {
    let config: BridgeSections =
        json5::from_str(r#"{ zenoh: { mode: "mesh" } }"#).expect("config should parse");
    assert!(config.zenoh.validate().is_err());
}
