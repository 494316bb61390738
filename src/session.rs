//! Session lifecycle: start, stop, purge

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::client::{InterceptHook, ReplayClient};
use crate::config::SessionConfig;
use crate::pipeline::{KeywordFilter, Modifier, Pipeline, RecordReplayStrategy};
use crate::store::FixtureStore;
use crate::transport::{HyperTransport, Transport};
use crate::{ReplayError, Result};

struct ActiveSession {
    config: SessionConfig,
    store: Arc<FixtureStore>,
}

/// Owns the session configuration and the interception lifecycle
///
/// Each controller is independent; tests running in parallel should each
/// use their own controller and hook.
pub struct SessionController {
    hook: InterceptHook,
    transport: Arc<dyn Transport>,
    modifiers: Vec<Arc<dyn Modifier>>,
    session: Option<ActiveSession>,
}

impl SessionController {
    /// Create a controller performing live calls through `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_hook(transport, InterceptHook::new())
    }

    /// Create a controller driving an existing hook
    #[must_use]
    pub fn with_hook(transport: Arc<dyn Transport>, hook: InterceptHook) -> Self {
        Self {
            hook,
            transport,
            modifiers: Vec::new(),
            session: None,
        }
    }

    /// Create a controller backed by [`HyperTransport`]
    ///
    /// # Errors
    ///
    /// Returns `TransportSetup` if the TLS client cannot be built
    pub fn with_hyper() -> Result<Self> {
        Ok(Self::new(Arc::new(HyperTransport::new()?)))
    }

    /// Client whose requests go through this controller's interception
    #[must_use]
    pub fn client(&self) -> ReplayClient {
        ReplayClient::new(self.hook.clone(), Arc::clone(&self.transport))
    }

    /// The hook this controller installs pipelines into
    pub fn hook(&self) -> &InterceptHook {
        &self.hook
    }

    /// Append a modifier to the chain of sessions started afterwards
    pub fn add_modifier(&mut self, modifier: Arc<dyn Modifier>) {
        self.modifiers.push(modifier);
    }

    /// Configure a session and start intercepting
    ///
    /// Fixtures live in `<parent of directory_hint>/__fixtures__/<session_name>/`.
    /// An empty `allowed_domains` intercepts every request.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration or session name is invalid
    pub fn start(
        &mut self,
        directory_hint: impl Into<PathBuf>,
        session_name: &str,
        recording_enabled: bool,
        allowed_domains: Vec<String>,
    ) -> Result<()> {
        self.start_with(SessionConfig::new(
            directory_hint,
            session_name,
            recording_enabled,
            allowed_domains,
        ))
    }

    /// Start intercepting with a prepared configuration
    ///
    /// Replaces any previously started session.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration or session name is invalid
    pub fn start_with(&mut self, config: SessionConfig) -> Result<()> {
        config.validate()?;
        let store = Arc::new(FixtureStore::for_session(
            &config.directory_hint,
            &config.session_name,
        )?);

        // Live calls go back through the hook; the live header makes the pipeline decline them
        let live: Arc<dyn Transport> = Arc::new(self.client());
        let strategy = Arc::new(RecordReplayStrategy::new(Arc::clone(&store), &config, live)?);

        let mut builder = Pipeline::builder()
            .strategy(Arc::new(KeywordFilter::new(config.allowed_domains.clone())))
            .strategy(strategy);
        for modifier in &self.modifiers {
            builder = builder.modifier(Arc::clone(modifier));
        }

        self.hook.install(Arc::new(builder.build()));

        info!(
            "Session '{}' started in {:?} mode at {}",
            store.session_name()?,
            config.mode,
            store.session_dir()?.display()
        );

        self.session = Some(ActiveSession { config, store });
        Ok(())
    }

    /// Stop intercepting; fixtures are kept
    ///
    /// # Errors
    ///
    /// Returns `SessionNotConfigured` if no session was started
    pub fn stop(&mut self) -> Result<()> {
        let session = self.session()?;
        let name = session.config.session_name.clone();
        self.hook.remove();
        info!("Session '{name}' stopped");
        Ok(())
    }

    /// Delete the configured session's fixture directory
    ///
    /// # Errors
    ///
    /// Returns `SessionNotConfigured` if no session was started, or
    /// `DirectoryRemoveFailed` if removal fails
    pub async fn purge_session(&self) -> Result<()> {
        self.session()?.store.remove_session_directory().await
    }

    /// Stop intercepting and forget the session configuration
    pub fn reset(&mut self) {
        self.hook.remove();
        self.session = None;
    }

    /// Configuration of the current session
    pub fn config(&self) -> Option<&SessionConfig> {
        self.session.as_ref().map(|session| &session.config)
    }

    /// Store of the current session
    pub fn store(&self) -> Option<&FixtureStore> {
        self.session.as_ref().map(|session| session.store.as_ref())
    }

    /// Whether a pipeline is installed in the hook
    pub fn is_intercepting(&self) -> bool {
        self.hook.is_active()
    }

    fn session(&self) -> Result<&ActiveSession> {
        self.session.as_ref().ok_or(ReplayError::SessionNotConfigured)
    }
}
