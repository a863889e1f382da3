//! Client-side projection of a relay session.
//!
//! The UI layer does not share mutable state with the relay; it holds a
//! `ClientView` and feeds it every event arriving on the client socket. The
//! view maintains the read-only projections the UI renders: the transcript
//! log, the grounding file collection, the playback buffer, and the last
//! fatal error.

use crate::audio::Player;
use crate::error::RelayError;
use crate::events::ClientBoundEvent;
use crate::grounding::{GroundingCollector, GroundingFile};
use crate::transcript::{TranscriptEntry, TranscriptLog};
use tracing::{debug, warn};

#[derive(Default)]
pub struct ClientView {
    transcript: TranscriptLog,
    grounding: GroundingCollector,
    player: Player,
    last_error: Option<String>,
}

impl ClientView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event from the client socket to the projections.
    ///
    /// Event kinds the view does not track are ignored; malformed payloads
    /// inside known kinds are logged and dropped.
    pub fn apply(&mut self, event_text: &str) {
        let event = match ClientBoundEvent::parse(event_text) {
            Ok(event) => event,
            Err(RelayError::MalformedEvent(reason)) => {
                debug!(%reason, "ignoring event the client view does not track");
                return;
            }
            Err(e) => {
                warn!(error = %e, "unexpected error decoding client-bound event");
                return;
            }
        };

        match event {
            // Barge-in: flush playback before any later delta is queued.
            ClientBoundEvent::SpeechStarted => self.player.clear(),
            ClientBoundEvent::ResponseAudioDelta { delta } => {
                if let Err(e) = self.player.enqueue_delta(&delta) {
                    warn!(error = %e, "dropping undecodable audio delta");
                }
            }
            ClientBoundEvent::ResponseDone { response } => {
                self.transcript.push_assistant_response(&response);
            }
            ClientBoundEvent::TranscriptionCompleted { transcript } => {
                self.transcript.push_user(&transcript);
            }
            ClientBoundEvent::ToolResponse { tool_result, .. } => {
                if let Err(e) = self.grounding.absorb(&tool_result) {
                    warn!(error = %e, "dropping tool response with invalid payload");
                }
            }
            ClientBoundEvent::Error { message } => {
                warn!(%message, "session error reported by relay");
                self.last_error = Some(message);
            }
        }
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        self.transcript.entries()
    }

    pub fn grounding_files(&self) -> &[GroundingFile] {
        self.grounding.files()
    }

    /// Drains up to `max_frames` of buffered playback audio.
    pub fn take_audio(&mut self, max_frames: usize) -> Vec<i16> {
        self.player.take_frames(max_frames)
    }

    pub fn buffered_audio(&self) -> usize {
        self.player.buffered()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode_pcm16;
    use serde_json::json;

    fn delta_event(samples: &[i16]) -> String {
        json!({"type": "response.audio.delta", "delta": encode_pcm16(samples)}).to_string()
    }

    #[test]
    fn transcription_and_response_build_the_transcript() {
        let mut view = ClientView::new();
        view.apply(
            r#"{"type":"conversation.item.input_audio_transcription.completed","transcript":"hello"}"#,
        );
        view.apply(
            &json!({
                "type": "response.done",
                "response": {"output": [{"content": [{"transcript": "hi there"}]}]}
            })
            .to_string(),
        );
        let transcript = view.transcript();
        assert_eq!(transcript.len(), 2);
        assert!(transcript[0].is_user);
        assert_eq!(transcript[0].text, "hello");
        assert!(!transcript[1].is_user);
        assert_eq!(transcript[1].text, "hi there");
    }

    #[test]
    fn empty_response_produces_no_transcript_entry() {
        let mut view = ClientView::new();
        view.apply(
            &json!({"type": "response.done", "response": {"output": [{"content": [{}]}]}})
                .to_string(),
        );
        assert!(view.transcript().is_empty());
    }

    #[test]
    fn barge_in_flushes_buffered_audio_before_next_delta() {
        let mut view = ClientView::new();
        view.apply(&delta_event(&[1; 480]));
        assert_eq!(view.buffered_audio(), 480);

        view.apply(r#"{"type":"input_audio_buffer.speech_started"}"#);
        assert_eq!(view.buffered_audio(), 0);

        view.apply(&delta_event(&[2; 240]));
        assert_eq!(view.take_audio(480), vec![2; 240]);
    }

    #[test]
    fn tool_responses_accumulate_grounding_files() {
        let mut view = ClientView::new();
        let result = r#"{"sources":[{"chunk_id":"a#1","title":"A","chunk":"text"}]}"#;
        let event = json!({
            "type": "extension.middle_tier_tool_response",
            "tool_name": "search",
            "tool_result": result,
        })
        .to_string();
        view.apply(&event);
        view.apply(&event);
        assert_eq!(view.grounding_files().len(), 2);
    }

    #[test]
    fn unknown_kinds_are_ignored() {
        let mut view = ClientView::new();
        view.apply(r#"{"type":"rate_limits.updated","rate_limits":[]}"#);
        assert!(view.transcript().is_empty());
        assert!(view.last_error().is_none());
    }

    #[test]
    fn errors_are_recorded() {
        let mut view = ClientView::new();
        view.apply(r#"{"type":"error","message":"upstream connection lost: eof"}"#);
        assert_eq!(view.last_error(), Some("upstream connection lost: eof"));
    }
}
