//! Groundwire API Library Crate
//!
//! This library contains the service half of the voice relay: configuration,
//! shared state, HTTP/WebSocket routing, the upstream realtime connection,
//! the retrieval client, and the per-session event pump. The `api` binary is
//! a thin wrapper around this library; the session logic itself lives in
//! `groundwire-core`.

pub mod config;
pub mod router;
pub mod search;
pub mod state;
pub mod tools;
pub mod ws;
