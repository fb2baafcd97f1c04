//! OAuth 1.0a request signing for user-context requests.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::RngCore;
use sha1::Sha1;

use chirp_core::{ConfigError, Error, Result};

/// RFC 3986 unreserved characters stay as they are; everything else is
/// percent-encoded.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Signs requests with HMAC-SHA1 on behalf of one user.
#[derive(Clone)]
pub(crate) struct OAuthSigner {
    consumer_key: String,
    consumer_secret: String,
    access_token: String,
    access_token_secret: String,
}

impl OAuthSigner {
    pub(crate) fn new(
        consumer_key: &str,
        consumer_secret: &str,
        access_token: &str,
        access_token_secret: &str,
    ) -> Self {
        Self {
            consumer_key: consumer_key.to_string(),
            consumer_secret: consumer_secret.to_string(),
            access_token: access_token.to_string(),
            access_token_secret: access_token_secret.to_string(),
        }
    }

    /// The `Authorization` header for a request.
    ///
    /// `url` must not carry a query string; query and form parameters go in
    /// `params`. JSON bodies are not part of the signature.
    pub(crate) fn authorization(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        timestamp: i64,
    ) -> Result<String> {
        self.authorization_with_nonce(method, url, params, timestamp, &generate_nonce())
    }

    fn authorization_with_nonce(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        timestamp: i64,
        nonce: &str,
    ) -> Result<String> {
        let mut oauth_params = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), "HMAC-SHA1".to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            ("oauth_token".to_string(), self.access_token.clone()),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];

        // Sorting happens after encoding.
        let mut encoded: Vec<(String, String)> = oauth_params
            .iter()
            .chain(params)
            .map(|(k, v)| (encode(k), encode(v)))
            .collect();
        encoded.sort();

        let param_string = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base_string = format!(
            "{}&{}&{}",
            method.to_uppercase(),
            encode(url),
            encode(&param_string)
        );
        let signing_key = format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(&self.access_token_secret)
        );

        oauth_params.push((
            "oauth_signature".to_string(),
            hmac_sha1(&signing_key, &base_string)?,
        ));

        let header = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(format!("OAuth {header}"))
    }
}

impl fmt::Debug for OAuthSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthSigner")
            .field("consumer_key", &self.consumer_key)
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}

fn encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hmac_sha1(key: &str, data: &str) -> Result<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes()).map_err(|e| {
        Error::Config(ConfigError::HttpClient {
            message: format!("cannot initialise HMAC: {e}"),
        })
    })?;
    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_reserved_characters() {
        assert_eq!(encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(encode("a=b&c"), "a%3Db%26c");
        assert_eq!(encode("safe-chars_.~"), "safe-chars_.~");
    }

    #[test]
    fn nonces_are_random_hex() {
        let a = generate_nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, generate_nonce());
    }

    #[test]
    fn matches_published_signature_example() {
        let signer = OAuthSigner::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        );
        let params = vec![
            ("include_entities".to_string(), "true".to_string()),
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
        ];
        let header = signer
            .authorization_with_nonce(
                "post",
                "https://api.twitter.com/1.1/statuses/update.json",
                &params,
                1318622958,
                "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            )
            .unwrap();

        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\""));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
    }

    #[test]
    fn debug_hides_secrets() {
        let signer = OAuthSigner::new("ck", "cs-secret", "at", "ats-secret");
        let debug = format!("{signer:?}");
        assert!(!debug.contains("cs-secret"));
        assert!(!debug.contains("ats-secret"));
    }
}
