//! Client-to-server event types

use base64::Engine;
use serde::Serialize;
use serde_json::Value;

use crate::{
    error::Result,
    types::{ContentPart, ConversationItem, Role},
};

/// Events a client sends to the realtime server.
///
/// Every constructor stamps a fresh `event_id` so server errors can be
/// correlated with the event that caused them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update the session configuration
    #[serde(rename = "session.update")]
    SessionUpdate { event_id: String, session: Value },

    /// Add an item to the conversation
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        event_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous_item_id: Option<String>,
        item: ConversationItem,
    },

    /// Ask the model to respond
    #[serde(rename = "response.create")]
    ResponseCreate {
        event_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<Value>,
    },

    /// Cancel the in-progress response
    #[serde(rename = "response.cancel")]
    ResponseCancel { event_id: String },

    /// Append base64 audio to the server's input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { event_id: String, audio: String },

    /// Commit the input buffer as a user message
    #[serde(rename = "input_audio_buffer.commit")]
    InputAudioBufferCommit { event_id: String },

    /// Discard the input buffer
    #[serde(rename = "input_audio_buffer.clear")]
    InputAudioBufferClear { event_id: String },
}

fn new_event_id() -> String {
    format!("evt_{}", uuid::Uuid::new_v4().simple())
}

impl ClientEvent {
    /// Replace the session configuration fields given in `session`
    pub fn session_update(session: Value) -> Self {
        Self::SessionUpdate {
            event_id: new_event_id(),
            session,
        }
    }

    /// Add a user text message to the conversation
    pub fn user_text(text: impl Into<String>) -> Self {
        let item_id = format!("item_{}", uuid::Uuid::new_v4().simple());
        Self::ConversationItemCreate {
            event_id: new_event_id(),
            previous_item_id: None,
            item: ConversationItem::message(item_id, Role::User)
                .with_content(vec![ContentPart::input_text(text)]),
        }
    }

    /// Add an arbitrary item after `previous_item_id` (or at the end)
    pub fn create_item(item: ConversationItem, previous_item_id: Option<String>) -> Self {
        Self::ConversationItemCreate {
            event_id: new_event_id(),
            previous_item_id,
            item,
        }
    }

    /// Request a response with default parameters
    pub fn response_create() -> Self {
        Self::ResponseCreate {
            event_id: new_event_id(),
            response: None,
        }
    }

    /// Request a response with explicit parameters
    pub fn response_create_with(response: Value) -> Self {
        Self::ResponseCreate {
            event_id: new_event_id(),
            response: Some(response),
        }
    }

    /// Cancel the in-progress response
    pub fn response_cancel() -> Self {
        Self::ResponseCancel {
            event_id: new_event_id(),
        }
    }

    /// Append raw audio bytes to the input buffer
    pub fn input_audio_append(audio: &[u8]) -> Self {
        Self::InputAudioBufferAppend {
            event_id: new_event_id(),
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
        }
    }

    /// Commit the input buffer
    pub fn input_audio_commit() -> Self {
        Self::InputAudioBufferCommit {
            event_id: new_event_id(),
        }
    }

    /// Clear the input buffer
    pub fn input_audio_clear() -> Self {
        Self::InputAudioBufferClear {
            event_id: new_event_id(),
        }
    }

    /// Returns the wire type string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SessionUpdate { .. } => "session.update",
            Self::ConversationItemCreate { .. } => "conversation.item.create",
            Self::ResponseCreate { .. } => "response.create",
            Self::ResponseCancel { .. } => "response.cancel",
            Self::InputAudioBufferAppend { .. } => "input_audio_buffer.append",
            Self::InputAudioBufferCommit { .. } => "input_audio_buffer.commit",
            Self::InputAudioBufferClear { .. } => "input_audio_buffer.clear",
        }
    }

    /// Returns the client-assigned event id
    pub fn event_id(&self) -> &str {
        match self {
            Self::SessionUpdate { event_id, .. }
            | Self::ConversationItemCreate { event_id, .. }
            | Self::ResponseCreate { event_id, .. }
            | Self::ResponseCancel { event_id }
            | Self::InputAudioBufferAppend { event_id, .. }
            | Self::InputAudioBufferCommit { event_id }
            | Self::InputAudioBufferClear { event_id } => event_id,
        }
    }

    /// Encode as a JSON message for the transport
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_update_shape() {
        let event = ClientEvent::session_update(json!({"instructions": "be brief"}));
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["instructions"], "be brief");
        assert_eq!(value["event_id"], event.event_id());
    }

    #[test]
    fn test_user_text_item() {
        let event = ClientEvent::user_text("hello");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "conversation.item.create");
        assert_eq!(value["item"]["type"], "message");
        assert_eq!(value["item"]["role"], "user");
        assert_eq!(
            value["item"]["content"],
            json!([{"type": "input_text", "text": "hello"}])
        );
        assert!(value.get("previous_item_id").is_none());
    }

    #[test]
    fn test_audio_append_is_base64() {
        let event = ClientEvent::input_audio_append(&[0, 1, 2, 255]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["audio"], "AAEC/w==");
        assert_eq!(event.event_type(), "input_audio_buffer.append");
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = ClientEvent::response_create();
        let b = ClientEvent::response_create();
        assert_ne!(a.event_id(), b.event_id());
        assert!(a.event_id().starts_with("evt_"));
    }

    #[test]
    fn test_response_create_omits_empty_params() {
        let value = serde_json::to_value(ClientEvent::response_create()).unwrap();
        assert!(value.get("response").is_none());
        let value =
            serde_json::to_value(ClientEvent::response_create_with(json!({"modalities": ["text"]})))
                .unwrap();
        assert_eq!(value["response"]["modalities"], json!(["text"]));
    }
}
