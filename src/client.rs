//! Transport-side interception hook

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::message::{Request, Response};
use crate::pipeline::{Outcome, Pipeline};
use crate::transport::Transport;
use crate::Result;

/// Shared slot holding the active pipeline
///
/// Clones share the slot, so a pipeline installed through one handle is seen
/// by every client built from another.
#[derive(Clone, Default)]
pub struct InterceptHook {
    slot: Arc<RwLock<Option<Arc<Pipeline>>>>,
}

impl InterceptHook {
    /// Create an empty hook
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate a pipeline, replacing any previous one
    pub fn install(&self, pipeline: Arc<Pipeline>) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(pipeline);
        debug!("Interception enabled");
    }

    /// Deactivate interception, returning the removed pipeline
    pub fn remove(&self) -> Option<Arc<Pipeline>> {
        let removed = self
            .slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if removed.is_some() {
            debug!("Interception disabled");
        }
        removed
    }

    /// Currently active pipeline
    pub fn active(&self) -> Option<Arc<Pipeline>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a pipeline is installed
    pub fn is_active(&self) -> bool {
        self.active().is_some()
    }
}

/// Transport that routes requests through the hook's active pipeline
///
/// Requests the pipeline declines, or all requests while no pipeline is
/// installed, go to the inner transport untouched.
#[derive(Clone)]
pub struct ReplayClient {
    hook: InterceptHook,
    inner: Arc<dyn Transport>,
}

impl ReplayClient {
    /// Wrap a transport behind a hook
    #[must_use]
    pub fn new(hook: InterceptHook, inner: Arc<dyn Transport>) -> Self {
        Self { hook, inner }
    }

    /// The hook this client consults
    pub fn hook(&self) -> &InterceptHook {
        &self.hook
    }
}

#[async_trait]
impl Transport for ReplayClient {
    async fn send(&self, request: Request) -> Result<Response> {
        let Some(pipeline) = self.hook.active() else {
            return self.inner.send(request).await;
        };

        match pipeline.process(request).await? {
            Outcome::Resolved(response) => Ok(response),
            Outcome::PassThrough(request) => self.inner.send(request).await,
        }
    }
}
