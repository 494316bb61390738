//! HTTP transport used for live calls

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use bytes::Bytes;
use hyper::{Method, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::message::{Headers, Request, Response};
use crate::{ReplayError, Result};

/// Something that can perform an HTTP exchange
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and collect the full response
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

/// Live transport on a pooled hyper client, HTTP and HTTPS
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl HyperTransport {
    /// Create a new hyper transport trusting the bundled web PKI roots
    ///
    /// # Errors
    ///
    /// Returns `TransportSetup` if the TLS configuration cannot be built
    pub fn new() -> Result<Self> {
        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| ReplayError::TransportSetup(format!("TLS configuration: {e}")))?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        let url = request.url.to_string();
        let uri = url
            .parse::<Uri>()
            .map_err(|e| ReplayError::InvalidRequestUrl(format!("{url}: {e}")))?;

        debug!("Sending {} to {}", request.method, uri);

        let method = request.method.parse::<Method>().map_err(|e| {
            live_failure(&url, format!("Invalid HTTP method '{}': {e}", request.method))
        })?;

        let mut request_builder = hyper::Request::builder().method(method).uri(uri);
        for (name, value) in &request.headers {
            request_builder = request_builder.header(name, value);
        }

        let http_request = request_builder
            .body(Full::new(Bytes::from(request.body.unwrap_or_default())))
            .map_err(|e| live_failure(&url, format!("Failed to build request: {e}")))?;

        let response = self.client.request(http_request).await.map_err(|e| {
            warn!("Request failed: {e}");
            live_failure(&url, format!("Request failed: {}", error_chain(&e)))
        })?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| live_failure(&url, format!("Failed to read response body: {e}")))?
            .to_bytes();

        Ok(Response {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Render an error followed by each of its sources
fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // hyper repeats the inner message in some wrappers
        if !rendered.ends_with(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}

fn live_failure(url: &str, cause: String) -> ReplayError {
    ReplayError::LiveRequestFailed {
        url: url.to_string(),
        cause,
    }
}

/// Flatten a hyper header map, joining repeated names with ", "
fn collect_headers(map: &hyper::HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for name in map.keys() {
        let value = map
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        headers.insert(name.to_string(), value);
    }
    headers
}
