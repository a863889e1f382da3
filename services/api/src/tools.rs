//! Grounding tool execution.
//!
//! The relay hands intercepted tool calls here. Execution always produces an
//! outcome: retrieval failures, malformed arguments, and unknown tool names
//! all collapse to an empty source list so the conversation continues with a
//! grounding-free answer instead of aborting.

use crate::search::Retriever;
use groundwire_core::error::RelayError;
use groundwire_core::grounding::ToolResultPayload;
use groundwire_core::policy::SEARCH_TOOL_NAME;
use groundwire_core::relay::{ToolInvocation, ToolOutcome};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

/// Executes one intercepted tool call.
pub async fn execute(retriever: Arc<dyn Retriever>, invocation: ToolInvocation) -> ToolOutcome {
    let payload = match run_search(&*retriever, &invocation).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, call_id = %invocation.call_id, "grounding failed, returning empty result");
            ToolResultPayload::empty()
        }
    };
    debug!(
        call_id = %invocation.call_id,
        sources = payload.sources.len(),
        "tool call finished"
    );
    ToolOutcome {
        call_id: invocation.call_id,
        tool_name: invocation.name,
        previous_item_id: invocation.previous_item_id,
        result_json: payload.to_json(),
    }
}

async fn run_search(
    retriever: &dyn Retriever,
    invocation: &ToolInvocation,
) -> Result<ToolResultPayload, RelayError> {
    if invocation.name != SEARCH_TOOL_NAME {
        return Err(RelayError::MalformedEvent(format!(
            "unknown tool '{}'",
            invocation.name
        )));
    }
    let args: SearchArgs = serde_json::from_str(&invocation.arguments)
        .map_err(|e| RelayError::MalformedEvent(format!("bad tool arguments: {e}")))?;
    let sources = retriever.search(&args.query).await?;
    Ok(ToolResultPayload { sources })
}
