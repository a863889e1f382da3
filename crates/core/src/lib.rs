//! Core session logic for the Groundwire voice relay.
//!
//! Everything in this crate is free of network I/O: the relay state machine
//! maps incoming wire events to actions, and the client-side projections
//! (transcript, grounding collection, playback buffer) are plain reducers.
//! The `groundwire-api` service supplies the sockets and the retrieval
//! backend and drives these types from its event pump.

pub mod audio;
pub mod client;
pub mod error;
pub mod events;
pub mod grounding;
pub mod policy;
pub mod relay;
pub mod transcript;
pub mod variant;
