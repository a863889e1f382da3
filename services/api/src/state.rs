//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the immutable
//! resources every session shares: the resolved configuration, the session
//! policy, and the retrieval client.

use crate::config::Config;
use crate::search::Retriever;
use groundwire_core::policy::SessionPolicy;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub policy: Arc<SessionPolicy>,
    pub retriever: Arc<dyn Retriever>,
}
