//! The relay session state machine.
//!
//! A `RelaySession` sits between the client-facing socket and the upstream
//! model connection. It is a synchronous reducer: each incoming event maps
//! to a list of [`Action`]s which the async pump in the service applies in
//! order. Keeping the interception rules here, out of the socket code, makes
//! every forwarding and rewrite decision testable without I/O.
//!
//! Interception rules: the client never sees function-call traffic, the
//! upstream never sees client-authored policy, and audio deltas are dropped
//! once the client has stopped recording.

use crate::error::RelayError;
use crate::events::{self, ItemEvent, kind};
use crate::policy::SessionPolicy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lifecycle of a relay session. `Closed` is terminal; a new start creates
/// a fresh session rather than reviving an old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
}

/// A tool call lifted out of the upstream event stream, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
    pub previous_item_id: Option<String>,
}

/// The result of one tool execution, delivered back to the session.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    pub previous_item_id: Option<String>,
    pub result_json: String,
}

/// What the pump should do with an event the session has processed.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ToUpstream(String),
    ToClient(String),
    RunTool(ToolInvocation),
}

pub struct RelaySession {
    state: RelayState,
    policy: Arc<SessionPolicy>,
    is_listening: bool,
    // call_id -> previous_item_id, recorded at conversation.item.created and
    // consumed when the call's arguments are complete.
    pending_calls: HashMap<String, Option<String>>,
    inflight_tools: usize,
}

impl RelaySession {
    pub fn new(policy: Arc<SessionPolicy>) -> Self {
        Self {
            state: RelayState::Idle,
            policy,
            is_listening: true,
            pending_calls: HashMap::new(),
            inflight_tools: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.is_listening
    }

    /// `Idle -> Connecting`. Returns the initial `session.update` carrying
    /// the merged server-held configuration, to be sent as soon as the
    /// upstream connection is open.
    pub fn begin_connect(&mut self) -> String {
        debug_assert_eq!(self.state, RelayState::Idle);
        self.state = RelayState::Connecting;
        self.policy.initial_session_update()
    }

    /// `Connecting -> Active`.
    pub fn upstream_ready(&mut self) {
        debug_assert_eq!(self.state, RelayState::Connecting);
        self.state = RelayState::Active;
    }

    /// `Active -> Closing`, on client stop or upstream error.
    pub fn begin_close(&mut self) {
        if self.state != RelayState::Closed {
            self.state = RelayState::Closing;
        }
    }

    /// `Closing -> Closed`. Terminal.
    pub fn mark_closed(&mut self) {
        self.state = RelayState::Closed;
    }

    /// Processes one text event from the client connection.
    ///
    /// Malformed events are logged and dropped. Calling this before the
    /// session is active is a programmer error and fails fast.
    pub fn handle_client_text(&mut self, text: &str) -> Result<Vec<Action>, RelayError> {
        match self.state {
            RelayState::Active => {}
            RelayState::Closing => return Ok(Vec::new()),
            RelayState::Idle | RelayState::Connecting | RelayState::Closed => {
                return Err(RelayError::NotConnected);
            }
        }

        let kind = match events::event_kind(text) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "dropping malformed client event");
                return Ok(Vec::new());
            }
        };

        let actions = match kind.as_str() {
            kind::SESSION_UPDATE => match self.rewrite_client_session_update(text) {
                Some(rewritten) => vec![Action::ToUpstream(rewritten)],
                None => Vec::new(),
            },
            kind::INPUT_AUDIO_APPEND => {
                self.is_listening = true;
                vec![Action::ToUpstream(text.to_string())]
            }
            kind::INPUT_AUDIO_CLEAR => {
                self.is_listening = false;
                vec![Action::ToUpstream(text.to_string())]
            }
            _ => vec![Action::ToUpstream(text.to_string())],
        };
        Ok(actions)
    }

    /// Processes one text event from the upstream connection.
    pub fn handle_upstream_text(&mut self, text: &str) -> Vec<Action> {
        match self.state {
            RelayState::Active | RelayState::Connecting => {}
            RelayState::Idle | RelayState::Closing | RelayState::Closed => return Vec::new(),
        }

        let kind = match events::event_kind(text) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "dropping malformed upstream event");
                return Vec::new();
            }
        };

        match kind.as_str() {
            kind::SESSION_CREATED => self.scrub_session_created(text),
            kind::OUTPUT_ITEM_ADDED => match ItemEvent::parse(text) {
                Ok(ev) if ev.item.is_function_call() => Vec::new(),
                _ => vec![Action::ToClient(text.to_string())],
            },
            kind::ITEM_CREATED => match ItemEvent::parse(text) {
                Ok(ev) if ev.item.is_function_call() => {
                    if let Some(call_id) = ev.item.call_id {
                        self.pending_calls
                            .entry(call_id)
                            .or_insert(ev.previous_item_id);
                    }
                    Vec::new()
                }
                Ok(ev) if ev.item.is_function_call_output() => Vec::new(),
                _ => vec![Action::ToClient(text.to_string())],
            },
            kind::FUNCTION_ARGS_DELTA | kind::FUNCTION_ARGS_DONE => Vec::new(),
            kind::OUTPUT_ITEM_DONE => match ItemEvent::parse(text) {
                Ok(ev) if ev.item.is_function_call() => self.intercept_tool_call(ev),
                _ => vec![Action::ToClient(text.to_string())],
            },
            kind::RESPONSE_DONE => {
                self.pending_calls.clear();
                vec![Action::ToClient(self.strip_function_output(text))]
            }
            kind::RESPONSE_AUDIO_DELTA => {
                if self.is_listening {
                    vec![Action::ToClient(text.to_string())]
                } else {
                    debug!("dropping audio delta, client stopped listening");
                    Vec::new()
                }
            }
            _ => vec![Action::ToClient(text.to_string())],
        }
    }

    /// Delivers a finished tool execution back into the session.
    ///
    /// The result event goes upstream, the grounding metadata goes to the
    /// client, and once nothing is left in flight the model is told to
    /// continue its turn. Outcomes arriving after close are discarded.
    pub fn tool_completed(&mut self, outcome: ToolOutcome) -> Vec<Action> {
        match self.state {
            RelayState::Active | RelayState::Connecting => {}
            RelayState::Idle | RelayState::Closing | RelayState::Closed => {
                debug!(call_id = %outcome.call_id, "discarding tool result for closed session");
                return Vec::new();
            }
        }
        self.inflight_tools = self.inflight_tools.saturating_sub(1);

        let mut actions = vec![
            Action::ToUpstream(events::function_call_output(
                &outcome.call_id,
                &outcome.result_json,
            )),
            Action::ToClient(events::tool_response(
                outcome.previous_item_id.as_deref(),
                &outcome.tool_name,
                &outcome.result_json,
            )),
        ];
        if self.inflight_tools == 0 {
            actions.push(Action::ToUpstream(events::response_create()));
        }
        actions
    }

    fn intercept_tool_call(&mut self, ev: ItemEvent) -> Vec<Action> {
        let Some(call_id) = ev.item.call_id else {
            warn!("function_call item without call_id, dropping");
            return Vec::new();
        };
        let previous_item_id = self
            .pending_calls
            .remove(&call_id)
            .flatten()
            .or(ev.previous_item_id);
        let invocation = ToolInvocation {
            call_id,
            name: ev.item.name.unwrap_or_default(),
            arguments: ev.item.arguments.unwrap_or_else(|| "{}".to_string()),
            previous_item_id,
        };
        self.inflight_tools += 1;
        vec![Action::RunTool(invocation)]
    }

    fn rewrite_client_session_update(&self, text: &str) -> Option<String> {
        let mut value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "dropping unparseable session.update");
                return None;
            }
        };
        match value.get_mut("session").and_then(Value::as_object_mut) {
            Some(session) => {
                self.policy.apply(session);
                Some(value.to_string())
            }
            None => {
                warn!("session.update without a session object, dropping");
                None
            }
        }
    }

    fn scrub_session_created(&self, text: &str) -> Vec<Action> {
        let mut value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "dropping unparseable session.created");
                return Vec::new();
            }
        };
        match value.get_mut("session").and_then(Value::as_object_mut) {
            Some(session) => {
                self.policy.scrub_created(session);
                vec![Action::ToClient(value.to_string())]
            }
            None => {
                warn!("session.created without a session object, dropping");
                Vec::new()
            }
        }
    }

    /// Removes function_call items from a completed response before it
    /// reaches the client.
    fn strip_function_output(&self, text: &str) -> String {
        let Ok(mut value) = serde_json::from_str::<Value>(text) else {
            return text.to_string();
        };
        let Some(output) = value
            .get_mut("response")
            .and_then(|r| r.get_mut("output"))
            .and_then(Value::as_array_mut)
        else {
            return text.to_string();
        };
        let before = output.len();
        output.retain(|item| item.get("type").and_then(Value::as_str) != Some("function_call"));
        if output.len() == before {
            text.to_string()
        } else {
            value.to_string()
        }
    }
}
