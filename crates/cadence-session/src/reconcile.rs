//! Folds inbound server events into session and conversation state.
//!
//! One event is reconciled at a time and runs to completion. Each observable
//! mutation is followed by exactly one notification before the next mutation.

use std::sync::Arc;

use cadence_wire::{RawEvent, ServerEvent, SessionDescriptor};

use crate::{
    conversation::{Conversation, EventOrigin},
    notify::{Notification, NotificationSink},
    patch::{self, Change, ContentTarget, Slot},
};

/// Session descriptor and conversation, as reconstructed from server events
#[derive(Debug, Default)]
pub struct Reconciler {
    session: Option<SessionDescriptor>,
    conversation: Conversation,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session descriptor; `None` before `session.created`
    pub fn session(&self) -> Option<&SessionDescriptor> {
        self.session.as_ref()
    }

    /// Current conversation
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Empty the conversation. Returns whether anything was removed.
    pub fn reset_conversation(&mut self) -> bool {
        let had_items = !self.conversation.is_empty();
        self.conversation.clear();
        had_items
    }

    /// Drop the session descriptor, returning it if one was set
    pub fn clear_session(&mut self) -> Option<SessionDescriptor> {
        self.session.take()
    }

    /// Parse and reconcile one raw transport message.
    ///
    /// Every well-formed message is forwarded on the server-event channel
    /// first, whether or not a handler exists for its type.
    pub fn handle_message(&mut self, message: &str, sink: &dyn NotificationSink) -> Vec<Change> {
        let raw = match RawEvent::parse(message) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Dropping unparseable server message: {}", e);
                return Vec::new();
            }
        };

        sink.emit(Notification::ServerEvent(Arc::new(raw.value.clone())));

        let event = match raw.decode() {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    "Server event {} (event {}) does not match its schema: {}",
                    raw.event_type,
                    raw.event_id().unwrap_or("-"),
                    e
                );
                return Vec::new();
            }
        };

        if !event.is_known() {
            tracing::debug!("No handler for server event type {}", raw.event_type);
            return Vec::new();
        }

        self.apply(&event, sink)
    }

    /// Reconcile one decoded event, notifying `sink` after each mutation
    pub fn apply(&mut self, event: &ServerEvent, sink: &dyn NotificationSink) -> Vec<Change> {
        let origin = EventOrigin::of(event);
        tracing::debug!(
            "Reconciling {} (event {})",
            origin.event_type,
            origin.event_id.unwrap_or("-")
        );

        let mut changes = Vec::new();
        match event {
            ServerEvent::Error { error, .. } => {
                tracing::warn!(
                    "Server error {}: {} (code: {}, client event: {})",
                    error.error_type,
                    error.message,
                    error.code.as_deref().unwrap_or("-"),
                    error.event_id.as_deref().unwrap_or("-")
                );
            }

            ServerEvent::SessionCreated { session, .. } => {
                self.session = Some(session.clone());
                changes.push(Change::SessionReplaced);
                sink.emit(Notification::SessionCreated(session.clone()));
            }

            ServerEvent::SessionUpdated { session, .. } => {
                self.session = Some(session.clone());
                changes.push(Change::SessionReplaced);
                sink.emit(Notification::SessionUpdated(session.clone()));
            }

            ServerEvent::ConversationItemCreated { item, .. } => {
                if self.conversation.contains(&item.id) {
                    tracing::warn!(
                        "Ignoring {} for item '{}' which already exists (event {})",
                        origin.event_type,
                        item.id,
                        origin.event_id.unwrap_or("-")
                    );
                } else {
                    self.conversation.push(item.clone());
                    self.record(
                        Some(Change::ItemAppended {
                            item_id: item.id.clone(),
                        }),
                        &mut changes,
                        sink,
                    );
                }
            }

            ServerEvent::ResponseAudioTranscriptDelta {
                item_id,
                content_index,
                delta,
                ..
            }
            | ServerEvent::InputAudioTranscriptionDelta {
                item_id,
                content_index,
                delta,
                ..
            } => {
                let change = patch::apply_delta(
                    &mut self.conversation,
                    ContentTarget::new(item_id, *content_index),
                    Slot::Transcript,
                    delta,
                    origin,
                );
                self.record(change, &mut changes, sink);
            }

            ServerEvent::ResponseAudioTranscriptDone {
                item_id,
                content_index,
                transcript,
                ..
            }
            | ServerEvent::InputAudioTranscriptionCompleted {
                item_id,
                content_index,
                transcript,
                ..
            } => {
                let change = patch::apply_completed_transcript(
                    &mut self.conversation,
                    ContentTarget::new(item_id, *content_index),
                    transcript,
                    origin,
                );
                self.record(change, &mut changes, sink);
            }

            ServerEvent::ResponseTextDelta {
                item_id,
                content_index,
                delta,
                ..
            } => {
                let change = patch::apply_delta(
                    &mut self.conversation,
                    ContentTarget::new(item_id, *content_index),
                    Slot::Text,
                    delta,
                    origin,
                );
                self.record(change, &mut changes, sink);
            }

            ServerEvent::ResponseTextDone {
                item_id,
                content_index,
                text,
                ..
            } => {
                let change = patch::apply_completed(
                    &mut self.conversation,
                    ContentTarget::new(item_id, *content_index),
                    Slot::Text,
                    text,
                    origin,
                );
                self.record(change, &mut changes, sink);
            }

            ServerEvent::ResponseDone { response, .. } => {
                // One notification per processed output, not per event.
                for output in &response.output {
                    let change =
                        patch::merge_response_output(&mut self.conversation, output, origin);
                    self.record(change, &mut changes, sink);
                }
            }

            ServerEvent::Unknown => {}
        }

        changes
    }

    fn record(
        &self,
        change: Option<Change>,
        changes: &mut Vec<Change>,
        sink: &dyn NotificationSink,
    ) {
        if let Some(change) = change {
            changes.push(change);
            sink.emit(Notification::ConversationChanged(self.conversation.snapshot()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use cadence_wire::{ContentPart, Role};
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        seen: RefCell<Vec<Notification>>,
    }

    impl NotificationSink for Recorder {
        fn emit(&self, notification: Notification) {
            self.seen.borrow_mut().push(notification);
        }
    }

    impl Recorder {
        fn kinds(&self) -> Vec<NotificationKind> {
            self.seen.borrow().iter().map(|n| n.kind()).collect()
        }

        fn count(&self, kind: NotificationKind) -> usize {
            self.seen.borrow().iter().filter(|n| n.kind() == kind).count()
        }

        fn clear(&self) {
            self.seen.borrow_mut().clear();
        }
    }

    fn feed(reconciler: &mut Reconciler, sink: &Recorder, value: serde_json::Value) -> Vec<Change> {
        reconciler.handle_message(&value.to_string(), sink)
    }

    fn item_created(id: &str, role: &str) -> serde_json::Value {
        json!({
            "type": "conversation.item.created",
            "event_id": format!("ev_{}", id),
            "previous_item_id": null,
            "item": {"id": id, "type": "message", "role": role}
        })
    }

    fn transcript_delta(item_id: &str, delta: &str) -> serde_json::Value {
        json!({
            "type": "response.audio_transcript.delta",
            "event_id": "ev_delta",
            "response_id": "resp_1",
            "item_id": item_id,
            "output_index": 0,
            "content_index": 0,
            "delta": delta
        })
    }

    fn transcript_done(item_id: &str, transcript: &str) -> serde_json::Value {
        json!({
            "type": "response.audio_transcript.done",
            "event_id": "ev_done",
            "response_id": "resp_1",
            "item_id": item_id,
            "output_index": 0,
            "content_index": 0,
            "transcript": transcript
        })
    }

    #[test]
    fn test_items_keep_arrival_order() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        for id in ["c", "a", "b", "z"] {
            feed(&mut reconciler, &sink, item_created(id, "user"));
        }
        assert_eq!(reconciler.conversation().snapshot().ids(), vec!["c", "a", "b", "z"]);
    }

    #[test]
    fn test_scenario_a_deltas_concatenate() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(&mut reconciler, &sink, item_created("a1", "user"));
        feed(&mut reconciler, &sink, transcript_delta("a1", "Hel"));
        feed(&mut reconciler, &sink, transcript_delta("a1", "lo"));

        let item = reconciler.conversation().get("a1").unwrap();
        assert_eq!(item.parts()[0].transcript(), Some("Hello"));
    }

    #[test]
    fn test_deltas_concatenate_onto_existing_content() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(
            &mut reconciler,
            &sink,
            json!({
                "type": "conversation.item.created",
                "item": {
                    "id": "a1", "type": "message", "role": "assistant",
                    "content": [{"type": "audio", "transcript": ""}]
                }
            }),
        );
        for d in ["one ", "two ", "three"] {
            feed(&mut reconciler, &sink, transcript_delta("a1", d));
        }

        let item = reconciler.conversation().get("a1").unwrap();
        assert_eq!(item.parts().len(), 1);
        assert_eq!(item.parts()[0].transcript(), Some("one two three"));
    }

    #[test]
    fn test_done_overwrites_deltas() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(&mut reconciler, &sink, item_created("a1", "assistant"));
        feed(&mut reconciler, &sink, transcript_delta("a1", "Good"));
        feed(&mut reconciler, &sink, transcript_delta("a1", "bye!!"));
        feed(&mut reconciler, &sink, transcript_done("a1", "Goodbye"));

        let item = reconciler.conversation().get("a1").unwrap();
        assert_eq!(item.parts().len(), 1);
        assert_eq!(item.parts()[0].transcript(), Some("Goodbye"));
    }

    #[test]
    fn test_scenario_b_done_without_content() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(&mut reconciler, &sink, item_created("a1", "user"));
        feed(&mut reconciler, &sink, transcript_done("a1", "Goodbye"));

        let item = reconciler.conversation().get("a1").unwrap();
        assert_eq!(item.parts().len(), 1);
        assert!(item.parts()[0].is_transcript_bearing());
        assert_eq!(item.parts()[0].transcript(), Some("Goodbye"));
    }

    #[test]
    fn test_input_transcription_completed_overwrites() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(
            &mut reconciler,
            &sink,
            json!({
                "type": "conversation.item.created",
                "item": {
                    "id": "u1", "type": "message", "role": "user",
                    "content": [{"type": "input_audio", "transcript": null}]
                }
            }),
        );
        feed(
            &mut reconciler,
            &sink,
            json!({
                "type": "conversation.item.input_audio_transcription.delta",
                "item_id": "u1", "content_index": 0, "delta": "draft"
            }),
        );
        let changes = feed(
            &mut reconciler,
            &sink,
            json!({
                "type": "conversation.item.input_audio_transcription.completed",
                "event_id": "ev_9", "item_id": "u1", "content_index": 0,
                "transcript": "final words"
            }),
        );

        assert_eq!(
            changes,
            vec![Change::ContentUpdated {
                item_id: "u1".into(),
                content_index: 0
            }]
        );
        let item = reconciler.conversation().get("u1").unwrap();
        assert_eq!(item.parts()[0].transcript(), Some("final words"));
    }

    #[test]
    fn test_scenario_c_response_done_fills_empty_item() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(&mut reconciler, &sink, item_created("a1", "assistant"));
        sink.clear();

        feed(
            &mut reconciler,
            &sink,
            json!({
                "type": "response.done",
                "event_id": "ev_rd",
                "response": {
                    "id": "resp_1",
                    "output": [{
                        "id": "a1", "type": "message", "role": "assistant",
                        "content": [{"type": "text", "text": "Hi"}]
                    }]
                }
            }),
        );

        let item = reconciler.conversation().get("a1").unwrap();
        assert_eq!(item.parts(), &[ContentPart::text("Hi")]);
        assert_eq!(sink.count(NotificationKind::ConversationChanged), 1);
    }

    #[test]
    fn test_response_done_notifies_per_output() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(
            &mut reconciler,
            &sink,
            json!({
                "type": "response.done",
                "response": {
                    "output": [
                        {"id": "m1", "type": "message", "role": "assistant",
                         "content": [{"type": "text", "text": "one"}]},
                        {"id": "f1", "type": "function_call", "name": "lookup",
                         "call_id": "c1", "arguments": "{}"},
                        {"id": "m2", "type": "message", "role": "assistant"},
                        {"id": "m3", "type": "message", "role": "assistant",
                         "content": [{"type": "text", "text": "three"}]}
                    ]
                }
            }),
        );

        assert_eq!(reconciler.conversation().snapshot().ids(), vec!["m1", "m3"]);
        assert_eq!(sink.count(NotificationKind::ConversationChanged), 2);
    }

    #[test]
    fn test_scenario_d_session_replaced_in_order() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(
            &mut reconciler,
            &sink,
            json!({"type": "session.created", "event_id": "e1", "session": {"model": "x"}}),
        );
        feed(
            &mut reconciler,
            &sink,
            json!({"type": "session.updated", "event_id": "e2", "session": {"model": "y"}}),
        );

        assert_eq!(reconciler.session().unwrap(), &json!({"model": "y"}));
        let session_kinds: Vec<_> = sink
            .kinds()
            .into_iter()
            .filter(|k| *k != NotificationKind::ServerEvent)
            .collect();
        assert_eq!(
            session_kinds,
            vec![NotificationKind::SessionCreated, NotificationKind::SessionUpdated]
        );
    }

    #[test]
    fn test_unknown_item_is_nonfatal() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(&mut reconciler, &sink, item_created("a1", "user"));
        let before = reconciler.conversation().snapshot();
        sink.clear();

        let changes = feed(&mut reconciler, &sink, transcript_delta("ghost", "boo"));
        let changes_done = feed(&mut reconciler, &sink, transcript_done("ghost", "boo"));

        assert!(changes.is_empty());
        assert!(changes_done.is_empty());
        assert_eq!(sink.count(NotificationKind::ConversationChanged), 0);
        let after = reconciler.conversation().get("a1").unwrap();
        assert_eq!(after, before.get("a1").unwrap());
    }

    #[test]
    fn test_delta_before_item_created_is_dropped() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();

        let changes = feed(&mut reconciler, &sink, transcript_delta("a1", "early"));
        assert!(changes.is_empty());
        assert!(reconciler.conversation().snapshot().is_empty());
        assert_eq!(sink.count(NotificationKind::ConversationChanged), 0);

        feed(&mut reconciler, &sink, item_created("a1", "assistant"));
        feed(&mut reconciler, &sink, transcript_delta("a1", "late"));

        let snapshot = reconciler.conversation().snapshot();
        assert_eq!(snapshot.ids(), vec!["a1"]);
        let item = snapshot.get("a1").unwrap();
        assert_eq!(item.parts().len(), 1);
        assert_eq!(item.parts()[0].transcript(), Some("late"));
    }

    #[test]
    fn test_unmodelled_content_survives_reconciliation() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        let item = json!({
            "id": "a1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "output_text", "text": "hi", "annotations": []}]
        });
        feed(
            &mut reconciler,
            &sink,
            json!({"type": "conversation.item.created", "item": item.clone()}),
        );

        let stored = reconciler.conversation().get("a1").unwrap();
        assert_eq!(stored.parts()[0].kind(), "output_text");
        assert_eq!(serde_json::to_value(stored).unwrap(), item);
    }

    #[test]
    fn test_unrecognized_event_is_passed_through_only() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        let raw = json!({"type": "rate_limits.updated", "event_id": "e5", "rate_limits": []});
        let changes = feed(&mut reconciler, &sink, raw.clone());

        assert!(changes.is_empty());
        assert_eq!(sink.kinds(), vec![NotificationKind::ServerEvent]);
        let Notification::ServerEvent(value) = &sink.seen.borrow()[0] else {
            panic!("expected passthrough");
        };
        assert_eq!(**value, raw);
    }

    #[test]
    fn test_error_event_mutates_nothing() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        let changes = feed(
            &mut reconciler,
            &sink,
            json!({"type": "error", "error": {"type": "server_error", "message": "oops"}}),
        );
        assert!(changes.is_empty());
        assert!(reconciler.session().is_none());
        assert_eq!(sink.kinds(), vec![NotificationKind::ServerEvent]);
    }

    #[test]
    fn test_malformed_messages_are_dropped() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        assert!(reconciler.handle_message("{not json", &sink).is_empty());
        assert!(reconciler.handle_message(r#"{"no":"type"}"#, &sink).is_empty());
        assert!(sink.kinds().is_empty());

        // Known type with the wrong shape is forwarded but not applied.
        let changes = feed(
            &mut reconciler,
            &sink,
            json!({"type": "conversation.item.created", "item": {"role": "user"}}),
        );
        assert!(changes.is_empty());
        assert!(reconciler.conversation().is_empty());
        assert_eq!(sink.kinds(), vec![NotificationKind::ServerEvent]);
    }

    #[test]
    fn test_duplicate_item_created_is_ignored() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(&mut reconciler, &sink, item_created("a1", "user"));
        feed(&mut reconciler, &sink, transcript_delta("a1", "kept"));
        let changes = feed(&mut reconciler, &sink, item_created("a1", "user"));

        assert!(changes.is_empty());
        assert_eq!(reconciler.conversation().len(), 1);
        assert_eq!(
            reconciler.conversation().get("a1").unwrap().parts()[0].transcript(),
            Some("kept")
        );
    }

    #[test]
    fn test_text_streaming() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(&mut reconciler, &sink, item_created("a1", "assistant"));
        for delta in ["Hi", " there"] {
            feed(
                &mut reconciler,
                &sink,
                json!({
                    "type": "response.text.delta", "item_id": "a1",
                    "output_index": 0, "content_index": 0, "delta": delta
                }),
            );
        }
        assert_eq!(reconciler.conversation().get("a1").unwrap().text(), "Hi there");

        feed(
            &mut reconciler,
            &sink,
            json!({
                "type": "response.text.done", "item_id": "a1",
                "output_index": 0, "content_index": 0, "text": "Hello there"
            }),
        );
        assert_eq!(
            reconciler.conversation().get("a1").unwrap().parts(),
            &[ContentPart::text("Hello there")]
        );
    }

    #[test]
    fn test_each_mutation_notifies_with_current_snapshot() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        feed(&mut reconciler, &sink, item_created("a1", "user"));
        feed(&mut reconciler, &sink, transcript_delta("a1", "Hel"));
        feed(&mut reconciler, &sink, transcript_delta("a1", "lo"));

        let snapshots: Vec<String> = sink
            .seen
            .borrow()
            .iter()
            .filter_map(|n| match n {
                Notification::ConversationChanged(s) => Some(s.get("a1").unwrap().text()),
                _ => None,
            })
            .collect();
        // Earlier snapshots still show the state at their notification.
        assert_eq!(snapshots, vec!["", "Hel", "Hello"]);
    }

    #[test]
    fn test_apply_typed_event_directly() {
        let mut reconciler = Reconciler::new();
        let sink = Recorder::default();
        let event = ServerEvent::ConversationItemCreated {
            event_id: None,
            previous_item_id: None,
            item: cadence_wire::ConversationItem::message("x1", Role::System),
        };
        let changes = reconciler.apply(&event, &sink);
        assert_eq!(
            changes,
            vec![Change::ItemAppended {
                item_id: "x1".into()
            }]
        );
        assert_eq!(sink.kinds(), vec![NotificationKind::ConversationChanged]);
    }
}
