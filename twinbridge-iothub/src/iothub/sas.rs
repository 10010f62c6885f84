//! Shared access signature tokens for IoT Hub device authentication.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ring::hmac;
use urlencoding::encode;

/// A signed token plus the epoch second it stops being accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken {
    pub token: String,
    pub expires_at: i64,
}

impl SasToken {
    /// Sign `resource_uri` with `key`, valid until `expires_at` (epoch seconds).
    pub fn generate(resource_uri: &str, key: &[u8], expires_at: i64) -> Self {
        let resource = encode(resource_uri);
        let to_sign = format!("{}\n{}", resource, expires_at);

        let key = hmac::Key::new(hmac::HMAC_SHA256, key);
        let signature = STANDARD.encode(hmac::sign(&key, to_sign.as_bytes()).as_ref());

        Self {
            token: format!(
                "SharedAccessSignature sr={}&sig={}&se={}",
                resource,
                encode(&signature),
                expires_at
            ),
            expires_at,
        }
    }

    /// Sign a token valid for `ttl_secs` from now.
    pub fn generate_for(resource_uri: &str, key: &[u8], ttl_secs: u64) -> Self {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let expires_at = chrono::Utc::now().timestamp().saturating_add(ttl);
        Self::generate(resource_uri, key, expires_at)
    }

    /// Whether the token expires within `margin_secs` of `now`.
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at - now <= margin_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_signature() {
        let token = SasToken::generate(
            "plant.azure-devices.net/devices/Socomech",
            b"secret-key",
            1_700_000_000,
        );

        assert_eq!(
            token.token,
            "SharedAccessSignature sr=plant.azure-devices.net%2Fdevices%2FSocomech\
             &sig=hQA7StnsIOT%2BfjqfZBUqPaNnWAqV2kJUsVEGjux6RLI%3D&se=1700000000"
        );
        assert_eq!(token.expires_at, 1_700_000_000);
    }

    #[test]
    fn test_resource_with_module_is_fully_encoded() {
        let token = SasToken::generate("hub.net/devices/d-1/modules/m_2", b"k", 42);
        assert!(
            token
                .token
                .starts_with("SharedAccessSignature sr=hub.net%2Fdevices%2Fd-1%2Fmodules%2Fm_2&sig=")
        );
        assert!(token.token.ends_with("&se=42"));
    }

    #[test]
    fn test_expiry_window() {
        let token = SasToken::generate("h/devices/d", b"k", 1_000);
        assert!(!token.expires_within(0, 60));
        assert!(token.expires_within(950, 60));
        assert!(token.expires_within(2_000, 60));
    }

    #[test]
    fn test_generate_for_is_in_the_future() {
        let now = chrono::Utc::now().timestamp();
        let token = SasToken::generate_for("h/devices/d", b"k", 3600);
        assert!(token.expires_at >= now + 3600);
    }
}
