//! Parsing of Azure IoT Hub device connection strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConnectionStringError {
    #[error("Connection string is missing '{0}'")]
    Missing(&'static str),
    #[error("Malformed connection string segment '{0}' (expected Key=Value)")]
    Malformed(String),
    #[error("SharedAccessKey is not valid base64")]
    InvalidKey,
    #[error("X.509 device authentication is not supported; use a SharedAccessKey")]
    X509Unsupported,
}

/// `HostName=...;DeviceId=...;SharedAccessKey=...` split into its parts.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceConnectionString {
    pub host_name: String,
    pub device_id: String,
    pub module_id: Option<String>,
    pub gateway_host_name: Option<String>,
    key: Vec<u8>,
}

impl std::fmt::Debug for DeviceConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnectionString")
            .field("host_name", &self.host_name)
            .field("device_id", &self.device_id)
            .field("module_id", &self.module_id)
            .field("gateway_host_name", &self.gateway_host_name)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl DeviceConnectionString {
    pub fn parse(input: &str) -> Result<Self, ConnectionStringError> {
        let mut host_name = None;
        let mut device_id = None;
        let mut module_id = None;
        let mut gateway_host_name = None;
        let mut key = None;
        let mut x509 = false;

        for segment in input.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            // Keys never contain '=', base64 values may end with it.
            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::Malformed(segment.to_string()))?;

            match name.trim() {
                "HostName" => host_name = Some(value.to_string()),
                "DeviceId" => device_id = Some(value.to_string()),
                "ModuleId" => module_id = Some(value.to_string()),
                "GatewayHostName" => gateway_host_name = Some(value.to_string()),
                "SharedAccessKey" => key = Some(value.to_string()),
                "x509" => x509 = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        let host_name = non_empty(host_name).ok_or(ConnectionStringError::Missing("HostName"))?;
        let device_id = non_empty(device_id).ok_or(ConnectionStringError::Missing("DeviceId"))?;
        let key = match non_empty(key) {
            Some(key) => STANDARD
                .decode(key)
                .map_err(|_| ConnectionStringError::InvalidKey)?,
            None if x509 => return Err(ConnectionStringError::X509Unsupported),
            None => return Err(ConnectionStringError::Missing("SharedAccessKey")),
        };

        Ok(Self {
            host_name,
            device_id,
            module_id: non_empty(module_id),
            gateway_host_name: non_empty(gateway_host_name),
            key,
        })
    }

    /// Decoded shared access key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Host the MQTT connection is opened against.
    pub fn connect_host(&self) -> &str {
        self.gateway_host_name.as_deref().unwrap_or(&self.host_name)
    }

    /// Resource URI signed into SAS tokens.
    pub fn resource_uri(&self) -> String {
        match &self.module_id {
            Some(module) => format!(
                "{}/devices/{}/modules/{}",
                self.host_name, self.device_id, module
            ),
            None => format!("{}/devices/{}", self.host_name, self.device_id),
        }
    }

    /// MQTT client id expected by the hub.
    pub fn client_id(&self) -> String {
        match &self.module_id {
            Some(module) => format!("{}/{}", self.device_id, module),
            None => self.device_id.clone(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_string() {
        let cs = DeviceConnectionString::parse(
            "HostName=plant.azure-devices.net;DeviceId=Socomech;SharedAccessKey=c2VjcmV0LWtleQ==",
        )
        .unwrap();

        assert_eq!(cs.host_name, "plant.azure-devices.net");
        assert_eq!(cs.device_id, "Socomech");
        assert_eq!(cs.key(), b"secret-key");
        assert_eq!(cs.connect_host(), "plant.azure-devices.net");
        assert_eq!(cs.resource_uri(), "plant.azure-devices.net/devices/Socomech");
        assert_eq!(cs.client_id(), "Socomech");
    }

    #[test]
    fn test_order_and_gateway() {
        let cs = DeviceConnectionString::parse(
            "SharedAccessKey=c2VjcmV0LWtleQ==; DeviceId=dev1 ;HostName=hub.azure-devices.net;GatewayHostName=edge.local;",
        )
        .unwrap();

        assert_eq!(cs.device_id, "dev1");
        assert_eq!(cs.connect_host(), "edge.local");
    }

    #[test]
    fn test_module_identity() {
        let cs = DeviceConnectionString::parse(
            "HostName=h;DeviceId=d;ModuleId=m;SharedAccessKey=c2VjcmV0LWtleQ==",
        )
        .unwrap();
        assert_eq!(cs.resource_uri(), "h/devices/d/modules/m");
        assert_eq!(cs.client_id(), "d/m");
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            DeviceConnectionString::parse("DeviceId=d;SharedAccessKey=c2VjcmV0LWtleQ=="),
            Err(ConnectionStringError::Missing("HostName"))
        );
        assert_eq!(
            DeviceConnectionString::parse("HostName=h;DeviceId=d"),
            Err(ConnectionStringError::Missing("SharedAccessKey"))
        );
        assert_eq!(
            DeviceConnectionString::parse("HostName=h;DeviceId=d;x509=true"),
            Err(ConnectionStringError::X509Unsupported)
        );
        assert_eq!(
            DeviceConnectionString::parse("HostName=h;DeviceId=d;SharedAccessKey=***"),
            Err(ConnectionStringError::InvalidKey)
        );
        assert!(matches!(
            DeviceConnectionString::parse("HostName=h;garbage"),
            Err(ConnectionStringError::Malformed(_))
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let cs =
            DeviceConnectionString::parse("HostName=h;DeviceId=d;SharedAccessKey=c2VjcmV0LWtleQ==")
                .unwrap();
        let debug = format!("{:?}", cs);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("c2VjcmV0"));
    }
}
