//! Per-session event pump.
//!
//! Drives one `RelaySession` to completion: a single cooperative loop
//! selects over the client socket, the upstream event stream, and finished
//! tool executions, applying the actions the state machine emits. Events of
//! one connection are processed strictly in arrival order; only tool
//! execution leaves the loop, so forwarding never waits on retrieval.

use crate::state::AppState;
use crate::tools;
use crate::ws::upstream::{self, UpstreamSink};
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use groundwire_core::error::RelayError;
use groundwire_core::events;
use groundwire_core::relay::{Action, RelaySession, ToolOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const CLOSE_GRACE: Duration = Duration::from_secs(2);
const TOOL_CHANNEL_CAPACITY: usize = 8;

enum EndReason {
    ClientClosed,
    ClientError(String),
    UpstreamLost(String),
}

/// Runs one relay session over an accepted client socket.
pub async fn run(state: Arc<AppState>, socket: WebSocket) -> Result<()> {
    let (mut client_tx, mut client_rx) = socket.split();
    let mut session = RelaySession::new(state.policy.clone());

    // Idle -> Connecting: open the upstream and inject server-held policy
    // before any client traffic is forwarded.
    let initial_update = session.begin_connect();
    let path = state.policy.variant().realtime_path();
    let (mut up_sink, mut up_events) = match upstream::connect(&state.config, path).await {
        Ok(parts) => parts,
        Err(e) => {
            error!(error = %e, "could not reach upstream, ending session");
            let _ = client_tx
                .send(Message::Text(events::error_event(&e.to_string()).into()))
                .await;
            return Ok(());
        }
    };
    up_sink.send_text(initial_update).await?;
    session.upstream_ready();

    let (tool_tx, mut tool_rx) = mpsc::channel::<ToolOutcome>(TOOL_CHANNEL_CAPACITY);

    let end = loop {
        tokio::select! {
            biased;
            Some(outcome) = tool_rx.recv() => {
                let actions = session.tool_completed(outcome);
                if let Some(end) = apply(actions, &mut up_sink, &mut client_tx, &tool_tx, &state).await {
                    break end;
                }
            }
            incoming = client_rx.next() => match incoming {
                Some(Ok(Message::Text(text))) => match session.handle_client_text(text.as_str()) {
                    Ok(actions) => {
                        if let Some(end) = apply(actions, &mut up_sink, &mut client_tx, &tool_tx, &state).await {
                            break end;
                        }
                    }
                    Err(e) => break EndReason::ClientError(e.to_string()),
                },
                Some(Ok(Message::Close(_))) | None => break EndReason::ClientClosed,
                Some(Ok(_)) => debug!("ignoring non-text client frame"),
                Some(Err(e)) => break EndReason::ClientError(e.to_string()),
            },
            event = up_events.recv() => match event {
                Some(Ok(text)) => {
                    let actions = session.handle_upstream_text(&text);
                    if let Some(end) = apply(actions, &mut up_sink, &mut client_tx, &tool_tx, &state).await {
                        break end;
                    }
                }
                Some(Err(e)) => break EndReason::UpstreamLost(e.to_string()),
                None => break EndReason::UpstreamLost("upstream stream ended".to_string()),
            },
        }
    };

    session.begin_close();
    match &end {
        EndReason::ClientClosed => info!("client closed the session"),
        EndReason::ClientError(e) => warn!(error = %e, "client connection error"),
        EndReason::UpstreamLost(reason) => {
            let message = RelayError::UpstreamDisconnected(reason.clone()).to_string();
            let _ = client_tx
                .send(Message::Text(events::error_event(&message).into()))
                .await;
        }
    }

    // Drain outbound sends with a bound, then release the connection. Tool
    // calls still in flight finish against a closed channel and their
    // results are discarded.
    if tokio::time::timeout(CLOSE_GRACE, up_sink.close()).await.is_err() {
        warn!("upstream close handshake timed out");
    }
    up_events.abort();
    session.mark_closed();
    info!("relay session closed");
    Ok(())
}

/// Applies the actions one processed event produced, in order.
async fn apply(
    actions: Vec<Action>,
    up_sink: &mut UpstreamSink,
    client_tx: &mut SplitSink<WebSocket, Message>,
    tool_tx: &mpsc::Sender<ToolOutcome>,
    state: &Arc<AppState>,
) -> Option<EndReason> {
    for action in actions {
        match action {
            Action::ToUpstream(text) => {
                if let Err(e) = up_sink.send_text(text).await {
                    return Some(EndReason::UpstreamLost(e.to_string()));
                }
            }
            Action::ToClient(text) => {
                if let Err(e) = client_tx.send(Message::Text(text.into())).await {
                    return Some(EndReason::ClientError(e.to_string()));
                }
            }
            Action::RunTool(invocation) => {
                debug!(call_id = %invocation.call_id, tool = %invocation.name, "executing grounding tool");
                let retriever = state.retriever.clone();
                let tool_tx = tool_tx.clone();
                tokio::spawn(async move {
                    let outcome = tools::execute(retriever, invocation).await;
                    if tool_tx.send(outcome).await.is_err() {
                        debug!("session ended before tool result delivery, discarding");
                    }
                });
            }
        }
    }
    None
}
