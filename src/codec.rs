//! Fixture codec: canonical JSON form of a request/response pair
//!
//! Bodies with a textual content type are stored as plain strings, everything
//! else (or text that cannot be decoded losslessly) as base64.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::message::{find_header, Headers, Request, Response};
use crate::{ReplayError, Result};

/// Header injected into every response served from a fixture
pub const REPLAY_MARKER_HEADER: &str = "X-Netreplay-Replayed";

/// Substring that marks a header as volatile under the default rule
pub const DEFAULT_VOLATILE_SUBSTRING: &str = "date";

/// MIME types stored as text besides `text/*`
const TEXT_MIME_TYPES: [&str; 5] = [
    "application/json",
    "application/xml",
    "application/javascript",
    "application/xhtml+xml",
    "application/x-www-form-urlencoded",
];

/// Persisted fixture record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Full target URL
    #[serde(default)]
    pub service: String,
    /// HTTP method
    #[serde(default)]
    pub request_type: String,
    /// Request headers, volatile keys removed
    #[serde(default)]
    pub request_headers: Headers,
    /// Request body
    #[serde(default)]
    pub request_body: EncodedBody,
    /// Response headers, volatile keys removed
    pub response_headers: Headers,
    /// HTTP status code
    pub status_code: u16,
    /// Response body
    pub response_data: EncodedBody,
}

/// Body stored either as text or base64
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedBody {
    /// Text or base64 payload
    pub data: String,
    /// Whether `data` is base64
    pub is_base64_encoded: bool,
}

/// Rule deciding which headers are too volatile to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolatileHeaders {
    /// Drop every header whose name contains the substring (ASCII case-insensitive)
    Substring(String),
    /// Drop exactly the listed header names (ASCII case-insensitive)
    Denylist(Vec<String>),
}

impl VolatileHeaders {
    /// Whether a header name is volatile under this rule
    pub fn is_volatile(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        match self {
            Self::Substring(needle) => name.contains(&needle.to_ascii_lowercase()),
            Self::Denylist(names) => names.iter().any(|n| n.eq_ignore_ascii_case(&name)),
        }
    }

    fn strip(&self, headers: &Headers) -> Headers {
        headers
            .iter()
            .filter(|(name, _)| !self.is_volatile(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl Default for VolatileHeaders {
    fn default() -> Self {
        Self::Substring(DEFAULT_VOLATILE_SUBSTRING.to_string())
    }
}

/// Encodes and decodes fixtures
#[derive(Debug, Clone, Default)]
pub struct FixtureCodec {
    volatile: VolatileHeaders,
}

impl FixtureCodec {
    /// Create a codec with a volatile-header rule
    #[must_use]
    pub fn new(volatile: VolatileHeaders) -> Self {
        Self { volatile }
    }

    /// Serialize a request and its live response into fixture bytes
    ///
    /// # Errors
    ///
    /// Returns `EncodingFailed` if JSON serialization fails
    pub fn encode(&self, request: &Request, response: &Response) -> Result<Vec<u8>> {
        let request_body = match request.body.as_deref() {
            Some(body) => encode_body(body, request.header("Content-Type")),
            None => EncodedBody::default(),
        };

        let fixture = Fixture {
            service: request.url.to_string(),
            request_type: request.method.clone(),
            request_headers: self.volatile.strip(&request.headers),
            request_body,
            response_headers: self.volatile.strip(&response.headers),
            status_code: response.status,
            response_data: encode_body(&response.body, response.header("Content-Type")),
        };

        serde_json::to_vec_pretty(&fixture).map_err(|e| ReplayError::EncodingFailed {
            cause: e.to_string(),
        })
    }

    /// Parse fixture bytes without reconstructing a response
    ///
    /// # Errors
    ///
    /// Returns `FixtureCorrupt` if required fields are missing or malformed
    pub fn parse(&self, bytes: &[u8], path: &Path) -> Result<Fixture> {
        let fixture: Fixture = serde_json::from_slice(bytes).map_err(|e| corrupt(path, e))?;

        if !(100..=999).contains(&fixture.status_code) {
            return Err(corrupt(
                path,
                format!("status code {} out of range", fixture.status_code),
            ));
        }

        Ok(fixture)
    }

    /// Reconstruct the recorded response, marked as replayed
    ///
    /// # Errors
    ///
    /// Returns `FixtureCorrupt` if the fixture cannot be fully decoded
    pub fn decode(&self, bytes: &[u8], path: &Path) -> Result<Response> {
        let fixture = self.parse(bytes, path)?;

        let content_type = find_header(&fixture.response_headers, "Content-Type");
        let body = decode_body(&fixture.response_data, content_type)
            .map_err(|reason| corrupt(path, format!("responseData: {reason}")))?;

        let mut headers = fixture.response_headers;
        headers.insert(REPLAY_MARKER_HEADER.to_string(), "true".to_string());

        Ok(Response {
            status: fixture.status_code,
            headers,
            body,
        })
    }
}

fn corrupt(path: &Path, reason: impl ToString) -> ReplayError {
    ReplayError::FixtureCorrupt {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Text encodings understood in a `charset` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Charset {
    Utf8,
    Utf16,
    Latin1,
}

/// Whether a content type is stored as text
fn is_textual(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/") || TEXT_MIME_TYPES.contains(&mime.as_str())
}

/// Charset named by a content type; UTF-8 when absent, `None` when unsupported
fn charset_of(content_type: &str) -> Option<Charset> {
    for parameter in content_type.split(';').skip(1) {
        let Some((key, value)) = parameter.split_once('=') else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("charset") {
            let value = value.trim().trim_matches('"').to_ascii_lowercase();
            return match value.as_str() {
                "utf-8" | "utf8" => Some(Charset::Utf8),
                "utf-16" => Some(Charset::Utf16),
                "iso-8859-1" | "latin1" => Some(Charset::Latin1),
                _ => None,
            };
        }
    }
    Some(Charset::Utf8)
}

fn decode_text(bytes: &[u8], charset: Charset) -> Option<String> {
    match charset {
        Charset::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
        Charset::Latin1 => Some(bytes.iter().map(|&b| char::from(b)).collect()),
        Charset::Utf16 => {
            let (big_endian, payload) = match bytes {
                [0xfe, 0xff, rest @ ..] => (true, rest),
                [0xff, 0xfe, rest @ ..] => (false, rest),
                _ => (true, bytes),
            };
            if payload.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = payload
                .chunks_exact(2)
                .map(|pair| {
                    if big_endian {
                        u16::from_be_bytes([pair[0], pair[1]])
                    } else {
                        u16::from_le_bytes([pair[0], pair[1]])
                    }
                })
                .collect();
            String::from_utf16(&units).ok()
        }
    }
}

fn encode_text(text: &str, charset: Charset) -> Option<Vec<u8>> {
    match charset {
        Charset::Utf8 => Some(text.as_bytes().to_vec()),
        Charset::Latin1 => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).ok())
            .collect(),
        Charset::Utf16 => Some(text.encode_utf16().flat_map(u16::to_be_bytes).collect()),
    }
}

fn encode_body(body: &[u8], content_type: Option<&str>) -> EncodedBody {
    if let Some(content_type) = content_type.filter(|ct| is_textual(ct)) {
        if let Some(charset) = charset_of(content_type) {
            // Keep the text form only when it reproduces the exact bytes
            if let Some(text) = decode_text(body, charset) {
                if encode_text(&text, charset).as_deref() == Some(body) {
                    return EncodedBody {
                        data: text,
                        is_base64_encoded: false,
                    };
                }
            }
        }
    }

    EncodedBody {
        data: BASE64.encode(body),
        is_base64_encoded: true,
    }
}

fn decode_body(body: &EncodedBody, content_type: Option<&str>) -> std::result::Result<Vec<u8>, String> {
    if body.is_base64_encoded {
        return BASE64
            .decode(body.data.as_bytes())
            .map_err(|e| format!("invalid base64: {e}"));
    }

    let charset = content_type.and_then(charset_of).unwrap_or(Charset::Utf8);
    encode_text(&body.data, charset).ok_or_else(|| format!("text not representable as {charset:?}"))
}
