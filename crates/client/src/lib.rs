//! Simulator client for item sessions.
//!
//! The `itemsim` binary is the composition root: it loads configuration,
//! installs logging, starts a [`item_runtime::Session`] and drives the
//! scripted [`scenario`] against it.

pub mod logging;
pub mod scenario;

pub use scenario::{ObserverOutcome, ScenarioReport};
