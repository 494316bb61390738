//! Interception pipeline: filter → handle → modify
//!
//! Filters decide whether a request is intercepted at all, handlers resolve an
//! intercepted request to a response, and modifiers post-process that
//! response in insertion order.

mod strategies;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::message::{Request, Response};
use crate::Result;

pub use strategies::{Decision, FnModifier, KeywordFilter, RecordReplayStrategy};

/// Header marking a request as the engine's own live call
pub const LIVE_REQUEST_HEADER: &str = "X-Netreplay-Live";

/// Decides whether a request is intercepted
pub trait Filter: Send + Sync {
    /// `false` makes the pipeline decline the request
    fn should_handle(&self, request: &Request) -> bool;
}

/// Resolves an intercepted request
#[async_trait]
pub trait Handler: Send + Sync {
    /// `Ok(None)` defers to the next handler
    async fn handle(&self, request: &Request) -> Result<Option<Response>>;
}

/// Post-processes a resolved response
#[async_trait]
pub trait Modifier: Send + Sync {
    /// Receives the previous modifier's output
    async fn modify(&self, request: &Request, response: Response) -> Result<Response>;
}

/// A component that may provide several pipeline capabilities
///
/// Capabilities are collected once when the strategy is added to a
/// [`PipelineBuilder`], in filter, handler, modifier order.
pub trait Strategy: Send + Sync + 'static {
    /// Filter capability
    fn into_filter(self: Arc<Self>) -> Option<Arc<dyn Filter>> {
        None
    }

    /// Handler capability
    fn into_handler(self: Arc<Self>) -> Option<Arc<dyn Handler>> {
        None
    }

    /// Modifier capability
    fn into_modifier(self: Arc<Self>) -> Option<Arc<dyn Modifier>> {
        None
    }
}

/// Result of running a request through the pipeline
#[derive(Debug)]
pub enum Outcome {
    /// Not intercepted; the caller should send the request itself
    PassThrough(Request),
    /// Intercepted and resolved
    Resolved(Response),
}

/// Ordered strategy chains
#[derive(Default)]
pub struct Pipeline {
    filters: Vec<Arc<dyn Filter>>,
    handlers: Vec<Arc<dyn Handler>>,
    modifiers: Vec<Arc<dyn Modifier>>,
}

impl Pipeline {
    /// Start building a pipeline
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Whether every filter accepts the request
    pub fn should_intercept(&self, request: &Request) -> bool {
        self.filters.iter().all(|filter| filter.should_handle(request))
    }

    /// Run one request through the pipeline
    ///
    /// A request is passed through when a filter rejects it or no handler
    /// resolves it.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a handler or modifier
    pub async fn process(&self, request: Request) -> Result<Outcome> {
        if !self.should_intercept(&request) {
            debug!("Passing through: {}", request.describe());
            return Ok(Outcome::PassThrough(request));
        }

        let mut resolved = None;
        for handler in &self.handlers {
            if let Some(response) = handler.handle(&request).await? {
                resolved = Some(response);
                break;
            }
        }

        let Some(mut response) = resolved else {
            debug!("No handler resolved {}", request.describe());
            return Ok(Outcome::PassThrough(request));
        };

        for modifier in &self.modifiers {
            response = modifier.modify(&request, response).await?;
        }

        Ok(Outcome::Resolved(response))
    }

    /// Number of (filters, handlers, modifiers)
    pub fn chain_lengths(&self) -> (usize, usize, usize) {
        (self.filters.len(), self.handlers.len(), self.modifiers.len())
    }
}

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    pipeline: Pipeline,
}

impl PipelineBuilder {
    /// Append a filter
    #[must_use]
    pub fn filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.pipeline.filters.push(filter);
        self
    }

    /// Append a handler
    #[must_use]
    pub fn handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.pipeline.handlers.push(handler);
        self
    }

    /// Append a modifier
    #[must_use]
    pub fn modifier(mut self, modifier: Arc<dyn Modifier>) -> Self {
        self.pipeline.modifiers.push(modifier);
        self
    }

    /// Append every capability a strategy provides
    #[must_use]
    pub fn strategy<S: Strategy>(mut self, strategy: Arc<S>) -> Self {
        if let Some(filter) = Arc::clone(&strategy).into_filter() {
            self.pipeline.filters.push(filter);
        }
        if let Some(handler) = Arc::clone(&strategy).into_handler() {
            self.pipeline.handlers.push(handler);
        }
        if let Some(modifier) = strategy.into_modifier() {
            self.pipeline.modifiers.push(modifier);
        }
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> Pipeline {
        self.pipeline
    }
}
