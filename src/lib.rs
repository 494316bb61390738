//! Netreplay - HTTP record/replay engine for deterministic tests
//!
//! A test starts a session through [`SessionController`] and sends its HTTP
//! traffic through the controller's [`ReplayClient`]. In record mode each
//! intercepted request is performed live once and persisted as a JSON
//! fixture; in replay mode the fixture is served without touching the network.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod message;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod transport;

pub use client::{InterceptHook, ReplayClient};
pub use codec::{Fixture, FixtureCodec, VolatileHeaders, REPLAY_MARKER_HEADER};
pub use config::{Mode, SessionConfig};
pub use error::{ReplayError, Result};
pub use fingerprint::{Fingerprint, Fingerprinter};
pub use message::{Headers, Request, Response};
pub use pipeline::{Filter, Handler, Modifier, Outcome, Pipeline, Strategy, LIVE_REQUEST_HEADER};
pub use session::SessionController;
pub use store::FixtureStore;
pub use transport::{HyperTransport, Transport};
