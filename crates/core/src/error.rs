//! Error taxonomy shared by the relay and its collaborators.

use thiserror::Error;

/// Session-scoped failures.
///
/// Only `UpstreamDisconnected` ends a session. `MalformedEvent` and
/// `RetrievalFailure` are absorbed where they occur: the offending event is
/// dropped (or an empty grounding result is returned) and the conversation
/// continues. `NotConnected` is a programmer error and fails fast.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("operation attempted before the session was connected")]
    NotConnected,
    #[error("upstream connection lost: {0}")]
    UpstreamDisconnected(String),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("retrieval request failed: {0}")]
    RetrievalFailure(String),
}
