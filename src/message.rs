//! Request and response values flowing through the engine

use std::collections::BTreeMap;

use url::Url;

use crate::{ReplayError, Result};

/// Header map with case-sensitive keys, kept sorted by key
pub type Headers = BTreeMap<String, String>;

/// Outgoing HTTP request as seen by the interception pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method (e.g., "GET", "POST")
    pub method: String,
    /// Target URL
    pub url: Url,
    /// Request headers
    pub headers: Headers,
    /// Request body, if any
    pub body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request from a method and URL string
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequestUrl` if the URL cannot be parsed
    pub fn new(method: &str, url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| ReplayError::InvalidRequestUrl(format!("{url}: {e}")))?;
        Ok(Self {
            method: method.to_string(),
            url,
            headers: Headers::new(),
            body: None,
        })
    }

    /// Add a header, replacing any previous value for the same key
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the request body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Look up a header by name, ignoring ASCII case
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Host of the target URL
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// Short `METHOD URL` description used in logs and errors
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.url)
    }
}

/// Resolved HTTP response: the (status, headers, body) tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: Headers,
    /// Response body
    pub body: Vec<u8>,
}

impl Response {
    /// Create a response with no headers
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Add a header, replacing any previous value for the same key
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Look up a header by name, ignoring ASCII case
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Whether this response was served from a fixture
    pub fn is_replayed(&self) -> bool {
        self.header(crate::codec::REPLAY_MARKER_HEADER) == Some("true")
    }
}

pub(crate) fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}
