//! Request fingerprinting for deterministic fixture names

use std::fmt;

use sha2::{Digest, Sha256};

use crate::message::Request;
use crate::{ReplayError, Result};

/// Default number of digest bytes kept in a fingerprint (16 hex characters)
pub const DEFAULT_FINGERPRINT_BYTES: usize = 8;

/// Placeholder used when a request URL has no host
pub const UNKNOWN_DOMAIN: &str = "unknown_domain";

/// Hex-encoded prefix of a request digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hex string form
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives fingerprints and fixture file names from requests
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    prefix_bytes: usize,
}

impl Fingerprinter {
    /// Create a fingerprinter keeping `prefix_bytes` bytes of the SHA-256 digest
    ///
    /// # Panics
    ///
    /// Panics if `prefix_bytes` is zero or larger than the digest (programming error)
    #[must_use]
    pub fn new(prefix_bytes: usize) -> Self {
        assert!(
            (1..=32).contains(&prefix_bytes),
            "prefix_bytes must be within 1..=32"
        );
        Self { prefix_bytes }
    }

    /// Create a fingerprinter, rejecting an out-of-range prefix length
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `prefix_bytes` is not within `1..=32`
    pub fn try_new(prefix_bytes: usize) -> Result<Self> {
        if (1..=32).contains(&prefix_bytes) {
            Ok(Self { prefix_bytes })
        } else {
            Err(ReplayError::ConfigError(format!(
                "fingerprint_bytes must be within 1..=32, got {prefix_bytes}"
            )))
        }
    }

    /// Compute the fingerprint of a request within a caller context
    ///
    /// The hashed input is, in order:
    /// 1. Caller context (session name)
    /// 2. Headers sorted by key, as `key:value` joined with `&`
    /// 3. Raw body bytes (nothing when absent)
    /// 4. Full URL
    ///
    /// For a UTF-8 body this is the digest of the concatenated string.
    #[must_use]
    pub fn fingerprint(&self, request: &Request, caller_context: &str) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(caller_context.as_bytes());
        hasher.update(canonical_headers(request).as_bytes());
        if let Some(body) = request.body.as_deref() {
            hasher.update(body);
        }
        hasher.update(request.url.as_str().as_bytes());
        let digest = hasher.finalize();
        Fingerprint(hex::encode(&digest[..self.prefix_bytes]))
    }

    /// Fixture file name: `{METHOD}_{sanitizedDomain}_{fingerprint}.json`
    #[must_use]
    pub fn file_name(&self, request: &Request, caller_context: &str) -> String {
        let domain = sanitize_domain(request.host().unwrap_or(UNKNOWN_DOMAIN));
        let fingerprint = self.fingerprint(request, caller_context);
        format!("{}_{domain}_{fingerprint}.json", request.method)
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(DEFAULT_FINGERPRINT_BYTES)
    }
}

/// Headers sorted by key, as `key:value` joined with `&`
fn canonical_headers(request: &Request) -> String {
    // BTreeMap iteration is already sorted by key
    request
        .headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Make a host name safe to embed in a file name
pub fn sanitize_domain(domain: &str) -> String {
    let stripped = domain
        .replace("https:", "")
        .replace("http:", "")
        .replace("//", "");
    let stripped = stripped.strip_prefix("www.").unwrap_or(&stripped);
    stripped.replace(':', "").replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_request() -> Request {
        Request::new("GET", "https://api.test/items/1").unwrap()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let fingerprinter = Fingerprinter::default();
        let request = test_request().with_header("Accept", "application/json");

        let hash1 = fingerprinter.fingerprint(&request, "session");
        let hash2 = fingerprinter.fingerprint(&request, "session");

        assert_eq!(hash1, hash2, "Fingerprint must be deterministic");
        assert_eq!(hash1.as_str().len(), 16);
        assert!(hash1.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_fingerprint_known_value() {
        // sha256("sessionhttps://api.test/items/1") truncated to 8 bytes
        let request = test_request();
        let expected = hex::encode(&Sha256::digest(b"sessionhttps://api.test/items/1")[..8]);

        let hash = Fingerprinter::default().fingerprint(&request, "session");
        assert_eq!(hash.as_str(), expected);
    }

    #[test]
    fn test_header_insertion_order_independence() {
        let fingerprinter = Fingerprinter::default();
        let req1 = test_request()
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json");
        let req2 = test_request()
            .with_header("Accept", "application/json")
            .with_header("Content-Type", "application/json");

        assert_eq!(
            fingerprinter.fingerprint(&req1, "s"),
            fingerprinter.fingerprint(&req2, "s"),
            "Header order should not affect fingerprint"
        );
    }

    #[test]
    fn test_caller_context_changes_fingerprint() {
        let fingerprinter = Fingerprinter::default();
        let request = test_request();

        assert_ne!(
            fingerprinter.fingerprint(&request, "test_a"),
            fingerprinter.fingerprint(&request, "test_b")
        );
    }

    #[test]
    fn test_binary_bodies_are_distinguished() {
        let fingerprinter = Fingerprinter::default();
        let req1 = test_request().with_body(vec![0xff, 0x00]);
        let req2 = test_request().with_body(vec![0xff, 0x01]);

        assert_ne!(
            fingerprinter.fingerprint(&req1, "s"),
            fingerprinter.fingerprint(&req2, "s")
        );
    }

    #[test]
    fn test_binary_body_differs_from_its_base64_text() {
        let fingerprinter = Fingerprinter::default();
        let upload = Request::new("POST", "https://api.test/upload").unwrap();
        let binary = upload.clone().with_body(vec![0xff]);
        let text = upload.with_body("/w==");

        assert_ne!(
            fingerprinter.fingerprint(&binary, "s"),
            fingerprinter.fingerprint(&text, "s")
        );
    }

    #[test]
    fn test_utf8_body_hashes_concatenated_string() {
        let request = Request::new("POST", "https://api.test/items")
            .unwrap()
            .with_header("Accept", "application/json")
            .with_body(r#"{"id":1}"#);
        let expected = hex::encode(
            &Sha256::digest(br#"sAccept:application/json{"id":1}https://api.test/items"#)[..8],
        );

        assert_eq!(
            Fingerprinter::default().fingerprint(&request, "s").as_str(),
            expected
        );
    }

    #[test]
    fn test_try_new_rejects_out_of_range() {
        assert!(matches!(Fingerprinter::try_new(0), Err(ReplayError::ConfigError(_))));
        assert!(matches!(Fingerprinter::try_new(33), Err(ReplayError::ConfigError(_))));
        assert_eq!(
            Fingerprinter::try_new(4).unwrap().fingerprint(&test_request(), "s"),
            Fingerprinter::new(4).fingerprint(&test_request(), "s")
        );
    }

    #[test]
    fn test_prefix_length_tunable() {
        let request = test_request();
        let short = Fingerprinter::new(4).fingerprint(&request, "s");
        let long = Fingerprinter::new(16).fingerprint(&request, "s");

        assert_eq!(short.as_str().len(), 8);
        assert_eq!(long.as_str().len(), 32);
        assert!(long.as_str().starts_with(short.as_str()));
    }

    #[test]
    fn test_file_name_format() {
        let request = test_request().with_header("Accept", "application/json");
        let fingerprinter = Fingerprinter::default();
        let name = fingerprinter.file_name(&request, "session");
        let hash = fingerprinter.fingerprint(&request, "session");

        assert_eq!(name, format!("GET_api.test_{hash}.json"));
    }

    #[test]
    fn test_file_name_strips_www_prefix() {
        let request = Request::new("POST", "http://www.example.com:8080/x").unwrap();
        let name = Fingerprinter::default().file_name(&request, "s");

        assert!(name.starts_with("POST_example.com_"), "got {name}");
    }

    #[test]
    fn test_sanitize_domain() {
        assert_eq!(sanitize_domain("www.example.com"), "example.com");
        assert_eq!(sanitize_domain("https://www.example.com"), "example.com");
        assert_eq!(sanitize_domain("localhost:8080"), "localhost8080");
        assert_eq!(sanitize_domain("a/b"), "a_b");
        assert_eq!(sanitize_domain(UNKNOWN_DOMAIN), UNKNOWN_DOMAIN);
    }

    proptest! {
        #[test]
        fn prop_header_value_sensitivity(value in "[a-z0-9]{1,16}", other in "[a-z0-9]{1,16}") {
            prop_assume!(value != other);
            let fingerprinter = Fingerprinter::default();
            let req1 = test_request().with_header("X-Key", &value);
            let req2 = test_request().with_header("X-Key", &other);

            prop_assert_ne!(
                fingerprinter.fingerprint(&req1, "s"),
                fingerprinter.fingerprint(&req2, "s")
            );
        }

        #[test]
        fn prop_body_sensitivity(body in proptest::collection::vec(any::<u8>(), 0..64), flip in any::<usize>()) {
            prop_assume!(!body.is_empty());
            let mut changed = body.clone();
            let index = flip % changed.len();
            changed[index] ^= 0x01;

            let fingerprinter = Fingerprinter::default();
            let req1 = test_request().with_body(body);
            let req2 = test_request().with_body(changed);

            prop_assert_ne!(
                fingerprinter.fingerprint(&req1, "s"),
                fingerprinter.fingerprint(&req2, "s")
            );
        }

        #[test]
        fn prop_fingerprint_repeatable(context in ".{0,24}", body in ".{0,64}") {
            let fingerprinter = Fingerprinter::default();
            let request = test_request().with_body(body.into_bytes());

            prop_assert_eq!(
                fingerprinter.fingerprint(&request, &context),
                fingerprinter.fingerprint(&request, &context)
            );
        }
    }
}
