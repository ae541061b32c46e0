//! ACS request signing
//!
//! Each request carries two headers:
//!
//! ```text
//! X-Akamai-ACS-Auth-Data: 5, 0.0.0.0, 0.0.0.0, <epoch>, <nonce>, <key name>
//! X-Akamai-ACS-Auth-Sign: base64(hmac_sha256(key, auth_data + path + "\n"
//!                                            + "x-akamai-acs-action:" + action + "\n"))
//! ```
//!
//! The server rejects stale timestamps and replayed nonces, so a context is
//! built fresh for every request and never reused.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use std::sync::Arc;

use super::ProviderError;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_DATA_HEADER: &str = "x-akamai-acs-auth-data";
pub const AUTH_SIGN_HEADER: &str = "x-akamai-acs-auth-sign";

/// Signature scheme version
const SIGNATURE_VERSION: u32 = 5;

/// Reserved auth-data fields, always 0.0.0.0
const RESERVED: &str = "0.0.0.0";

/// Upload account credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    key: SecretString,
    key_name: String,
}

impl Credentials {
    pub fn new(key: SecretString, key_name: impl Into<String>) -> Self {
        Self {
            key,
            key_name: key_name.into(),
        }
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    fn is_complete(&self) -> bool {
        !self.key.expose_secret().is_empty() && !self.key_name.is_empty()
    }
}

/// Source of the signing timestamp (epoch seconds)
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed timestamp, for reproducible signatures
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

/// Source of per-request nonces
pub trait NonceSource: Send + Sync {
    fn next_nonce(&self) -> String;
}

/// Random v4 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNonce;

impl NonceSource for RandomNonce {
    fn next_nonce(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// Always the same nonce, for reproducible signatures
#[derive(Debug, Clone)]
pub struct FixedNonce(pub String);

impl NonceSource for FixedNonce {
    fn next_nonce(&self) -> String {
        self.0.clone()
    }
}

/// Everything that goes into one signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureContext {
    pub timestamp: i64,
    pub nonce: String,
    /// URL path only, query stripped
    pub request_path: String,
    pub action: String,
}

/// The pair of auth headers produced for a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub auth_data: String,
    pub auth_sign: String,
}

/// Computes ACS auth headers
///
/// Credentials are immutable and shared; the signer can be cloned freely
/// across concurrent operations.
#[derive(Clone)]
pub struct Signer {
    credentials: Arc<Credentials>,
    clock: Arc<dyn Clock>,
    nonces: Arc<dyn NonceSource>,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("key_name", &self.credentials.key_name)
            .finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Arc::new(credentials),
            clock: Arc::new(SystemClock),
            nonces: Arc::new(RandomNonce),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_nonce_source(mut self, nonces: impl NonceSource + 'static) -> Self {
        self.nonces = Arc::new(nonces);
        self
    }

    /// Build a fresh context for a request to `url` carrying `action`
    pub fn context(&self, url: &url::Url, action: &str) -> SignatureContext {
        SignatureContext {
            timestamp: self.clock.now(),
            nonce: self.nonces.next_nonce(),
            request_path: url.path().to_string(),
            action: action.to_string(),
        }
    }

    /// Compute both auth headers for a context
    pub fn sign(&self, ctx: &SignatureContext) -> Result<AuthHeaders, ProviderError> {
        if !self.credentials.is_complete() {
            return Err(ProviderError::Configuration(
                "signing key and key name must be set before signing requests".to_string(),
            ));
        }

        let auth_data = [
            SIGNATURE_VERSION.to_string(),
            RESERVED.to_string(),
            RESERVED.to_string(),
            ctx.timestamp.to_string(),
            ctx.nonce.clone(),
            self.credentials.key_name.clone(),
        ]
        .join(", ");

        let string_to_sign = Self::data_to_sign(&auth_data, ctx);

        let mut mac = HmacSha256::new_from_slice(self.credentials.key.expose_secret().as_bytes())
            .map_err(|e| ProviderError::Configuration(format!("HMAC error: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let auth_sign = BASE64.encode(mac.finalize().into_bytes());

        Ok(AuthHeaders { auth_data, auth_sign })
    }

    fn data_to_sign(auth_data: &str, ctx: &SignatureContext) -> String {
        format!(
            "{}{}\nx-akamai-acs-action:{}\n",
            auth_data,
            ctx.request_path,
            ctx.action.trim()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> Signer {
        Signer::new(Credentials::new(SecretString::from("netstorage-key".to_string()), "key-name"))
    }

    fn ctx() -> SignatureContext {
        SignatureContext {
            timestamp: 1_400_000_000,
            nonce: "0123456789abcdef".to_string(),
            request_path: "/123456/test/example.txt".to_string(),
            action: "version=1&action=stat&format=xml".to_string(),
        }
    }

    #[test]
    fn test_auth_data_layout() {
        let headers = signer().sign(&ctx()).unwrap();
        assert_eq!(
            headers.auth_data,
            "5, 0.0.0.0, 0.0.0.0, 1400000000, 0123456789abcdef, key-name"
        );
    }

    #[test]
    fn test_signature_matches_manual_hmac() {
        let headers = signer().sign(&ctx()).unwrap();

        let data = "5, 0.0.0.0, 0.0.0.0, 1400000000, 0123456789abcdef, key-name\
                    /123456/test/example.txt\n\
                    x-akamai-acs-action:version=1&action=stat&format=xml\n";
        let mut mac = HmacSha256::new_from_slice(b"netstorage-key").unwrap();
        mac.update(data.as_bytes());
        let expected = BASE64.encode(mac.finalize().into_bytes());

        assert_eq!(headers.auth_sign, expected);
    }

    #[test]
    fn test_signature_is_deterministic() {
        let a = signer().sign(&ctx()).unwrap();
        let b = signer().sign(&ctx()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_input_changes_signature() {
        let base = signer().sign(&ctx()).unwrap().auth_sign;

        let mut variants = Vec::new();
        let mut c = ctx();
        c.timestamp += 1;
        variants.push(signer().sign(&c).unwrap().auth_sign);

        let mut c = ctx();
        c.nonce = "fedcba9876543210".to_string();
        variants.push(signer().sign(&c).unwrap().auth_sign);

        let mut c = ctx();
        c.request_path = "/123456/test/other.txt".to_string();
        variants.push(signer().sign(&c).unwrap().auth_sign);

        let mut c = ctx();
        c.action = "version=1&action=download&format=xml".to_string();
        variants.push(signer().sign(&c).unwrap().auth_sign);

        let other_key = Signer::new(Credentials::new(SecretString::from("other-key".to_string()), "key-name"));
        variants.push(other_key.sign(&ctx()).unwrap().auth_sign);

        let other_name = Signer::new(Credentials::new(SecretString::from("netstorage-key".to_string()), "other-name"));
        variants.push(other_name.sign(&ctx()).unwrap().auth_sign);

        for (i, sig) in variants.iter().enumerate() {
            assert_ne!(sig, &base, "variant {} collided with base", i);
            for other in &variants[i + 1..] {
                assert_ne!(sig, other);
            }
        }
    }

    #[test]
    fn test_action_is_trimmed() {
        let mut padded = ctx();
        padded.action = format!("  {}\n", ctx().action);
        assert_eq!(signer().sign(&padded).unwrap(), signer().sign(&ctx()).unwrap());
    }

    #[test]
    fn test_missing_credentials() {
        let empty = Signer::new(Credentials::new(SecretString::from(String::new()), "key-name"));
        assert!(matches!(empty.sign(&ctx()), Err(ProviderError::Configuration(_))));

        let unnamed = Signer::new(Credentials::new(SecretString::from("k".to_string()), ""));
        assert!(matches!(unnamed.sign(&ctx()), Err(ProviderError::Configuration(_))));
    }

    #[test]
    fn test_context_strips_query() {
        let signer = signer()
            .with_clock(FixedClock(42))
            .with_nonce_source(FixedNonce("n".to_string()));
        let url = url::Url::parse("https://host.example.org/123456/a.txt?x=1").unwrap();
        let ctx = signer.context(&url, "version=1&action=upload");
        assert_eq!(ctx.request_path, "/123456/a.txt");
        assert_eq!(ctx.timestamp, 42);
        assert_eq!(ctx.nonce, "n");
    }

    #[test]
    fn test_default_nonces_are_unique() {
        let url = url::Url::parse("https://host.example.org/123456/a.txt").unwrap();
        let s = signer();
        assert_ne!(s.context(&url, "a").nonce, s.context(&url, "a").nonce);
    }
}
