//! Built-in strategies

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Filter, Handler, Modifier, Strategy, LIVE_REQUEST_HEADER};
use crate::codec::FixtureCodec;
use crate::config::{Mode, SessionConfig};
use crate::fingerprint::Fingerprinter;
use crate::message::{Request, Response};
use crate::store::FixtureStore;
use crate::transport::Transport;
use crate::{ReplayError, Result};

/// Intercepts requests whose URL contains one of the keywords
///
/// An empty keyword list intercepts everything.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    keywords: Vec<String>,
}

impl KeywordFilter {
    /// Create a filter from an allow-list
    #[must_use]
    pub fn new(keywords: Vec<String>) -> Self {
        Self { keywords }
    }
}

impl Filter for KeywordFilter {
    fn should_handle(&self, request: &Request) -> bool {
        if self.keywords.is_empty() {
            return true;
        }
        let url = request.url.as_str();
        self.keywords.iter().any(|keyword| url.contains(keyword.as_str()))
    }
}

impl Strategy for KeywordFilter {
    fn into_filter(self: Arc<Self>) -> Option<Arc<dyn Filter>> {
        Some(self)
    }
}

/// What the record/replay handler does with one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Serve the fixture on disk
    Replay,
    /// Perform a live call and persist it first
    Record,
    /// Surface `FixtureNotFound`
    Fail,
}

impl Decision {
    /// Choose an action from the mode and fixture state
    ///
    /// In record mode a fixture already on disk is re-recorded unless this
    /// session wrote it.
    pub fn decide(mode: Mode, fixture_exists: bool, recorded_this_session: bool) -> Self {
        match (mode, fixture_exists) {
            (Mode::Replay, true) => Self::Replay,
            (Mode::Replay, false) => Self::Fail,
            (Mode::Record, true) if recorded_this_session => Self::Replay,
            (Mode::Record, _) => Self::Record,
        }
    }
}

/// Combined filter and handler running the record/replay state machine
pub struct RecordReplayStrategy {
    store: Arc<FixtureStore>,
    codec: FixtureCodec,
    fingerprinter: Fingerprinter,
    mode: Mode,
    transport: Arc<dyn Transport>,
    flights: DashMap<String, Arc<Mutex<()>>>,
    recorded: DashSet<String>,
}

impl RecordReplayStrategy {
    /// Create the strategy for a configured session
    ///
    /// `transport` performs live calls while recording; those calls carry
    /// [`LIVE_REQUEST_HEADER`] so an interception hook in front of it declines them.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration is invalid
    pub fn new(
        store: Arc<FixtureStore>,
        config: &SessionConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            codec: FixtureCodec::new(config.volatile_rule()),
            fingerprinter: config.fingerprinter()?,
            mode: config.mode,
            transport,
            flights: DashMap::new(),
            recorded: DashSet::new(),
        })
    }

    /// Operating mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Number of fixtures written by this strategy
    pub fn recorded_count(&self) -> usize {
        self.recorded.len()
    }

    fn flight(&self, file_name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.flights
                .entry(file_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    async fn replay(&self, file_name: &str) -> Result<Response> {
        let path = self.store.fixture_path(file_name)?;
        let bytes = self.store.read(file_name).await?;
        let response = self.codec.decode(&bytes, &path)?;
        debug!("Replay cache hit: {file_name}");
        Ok(response)
    }

    async fn record(&self, request: &Request, file_name: &str) -> Result<()> {
        let url = request.url.to_string();
        let live = request
            .clone()
            .with_header(LIVE_REQUEST_HEADER, "true");

        let response = self.transport.send(live).await.map_err(|e| match e {
            ReplayError::LiveRequestFailed { .. } | ReplayError::InvalidRequestUrl(_) => e,
            other => ReplayError::LiveRequestFailed {
                url: url.clone(),
                cause: other.to_string(),
            },
        })?;

        let bytes = self.codec.encode(request, &response)?;
        let path = self.store.write(file_name, &bytes).await?;
        self.recorded.insert(file_name.to_string());

        info!(
            "Recorded interaction: {} -> {} ({})",
            request.describe(),
            response.status,
            path.display()
        );
        Ok(())
    }
}

impl Filter for RecordReplayStrategy {
    fn should_handle(&self, request: &Request) -> bool {
        if request.header(LIVE_REQUEST_HEADER).is_some() {
            return false;
        }
        if !matches!(request.url.scheme(), "http" | "https") {
            return false;
        }
        debug!("Intercepting request: {}", request.describe());
        true
    }
}

#[async_trait]
impl Handler for RecordReplayStrategy {
    async fn handle(&self, request: &Request) -> Result<Option<Response>> {
        let file_name = self
            .fingerprinter
            .file_name(request, self.store.session_name()?);

        // Identical recordings are serialized so only the first performs a live call
        let _flight = if self.mode.is_record() {
            Some(self.flight(&file_name).lock_owned().await)
        } else {
            None
        };

        let exists = self.store.exists(&file_name).await?;
        let recorded = self.recorded.contains(&file_name);

        match Decision::decide(self.mode, exists, recorded) {
            Decision::Replay => self.replay(&file_name).await.map(Some),
            Decision::Record => {
                if exists {
                    debug!("Re-recording {file_name}");
                }
                self.record(request, &file_name).await?;
                self.replay(&file_name).await.map(Some)
            }
            Decision::Fail => {
                let expected_path = self.store.fixture_path(&file_name)?;
                warn!(
                    "No fixture for {} at {}",
                    request.describe(),
                    expected_path.display()
                );
                Err(ReplayError::FixtureNotFound {
                    request: request.describe(),
                    expected_path,
                })
            }
        }
    }
}

impl Strategy for RecordReplayStrategy {
    fn into_filter(self: Arc<Self>) -> Option<Arc<dyn Filter>> {
        Some(self)
    }

    fn into_handler(self: Arc<Self>) -> Option<Arc<dyn Handler>> {
        Some(self)
    }
}

/// Modifier backed by a closure
pub struct FnModifier<F> {
    f: F,
}

impl<F> FnModifier<F>
where
    F: Fn(&Request, Response) -> Result<Response> + Send + Sync,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Modifier for FnModifier<F>
where
    F: Fn(&Request, Response) -> Result<Response> + Send + Sync,
{
    async fn modify(&self, request: &Request, response: Response) -> Result<Response> {
        (self.f)(request, response)
    }
}

impl<F> Strategy for FnModifier<F>
where
    F: Fn(&Request, Response) -> Result<Response> + Send + Sync + 'static,
{
    fn into_modifier(self: Arc<Self>) -> Option<Arc<dyn Modifier>> {
        Some(self)
    }
}
