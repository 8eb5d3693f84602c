//! Server-to-client event types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    types::{ConversationItem, ErrorDetail, Response, SessionDescriptor},
};

/// Events emitted by the realtime server.
///
/// Discriminated by the `type` field. Types this schema version does not
/// model deserialize to [`ServerEvent::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Server-side error. Most are recoverable.
    #[serde(rename = "error")]
    Error {
        event_id: Option<String>,
        #[serde(default)]
        error: ErrorDetail,
    },

    /// First session configuration after connecting
    #[serde(rename = "session.created")]
    SessionCreated {
        event_id: Option<String>,
        session: SessionDescriptor,
    },

    /// Session configuration after a `session.update`
    #[serde(rename = "session.updated")]
    SessionUpdated {
        event_id: Option<String>,
        session: SessionDescriptor,
    },

    /// A conversation item was created
    #[serde(rename = "conversation.item.created")]
    ConversationItemCreated {
        event_id: Option<String>,
        previous_item_id: Option<String>,
        item: ConversationItem,
    },

    /// Incremental transcript of model audio
    #[serde(rename = "response.audio_transcript.delta")]
    ResponseAudioTranscriptDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: String,
        output_index: Option<u32>,
        content_index: usize,
        delta: String,
    },

    /// Final transcript of model audio
    #[serde(rename = "response.audio_transcript.done")]
    ResponseAudioTranscriptDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: String,
        output_index: Option<u32>,
        content_index: usize,
        transcript: String,
    },

    /// Incremental transcript of user audio
    #[serde(rename = "conversation.item.input_audio_transcription.delta")]
    InputAudioTranscriptionDelta {
        event_id: Option<String>,
        item_id: String,
        content_index: usize,
        delta: String,
    },

    /// Final transcript of user audio
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputAudioTranscriptionCompleted {
        event_id: Option<String>,
        item_id: String,
        content_index: usize,
        transcript: String,
    },

    /// Incremental model text
    #[serde(rename = "response.text.delta")]
    ResponseTextDelta {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: String,
        output_index: Option<u32>,
        content_index: usize,
        delta: String,
    },

    /// Final model text
    #[serde(rename = "response.text.done")]
    ResponseTextDone {
        event_id: Option<String>,
        response_id: Option<String>,
        item_id: String,
        output_index: Option<u32>,
        content_index: usize,
        text: String,
    },

    /// A response finished; carries every output item it produced
    #[serde(rename = "response.done")]
    ResponseDone {
        event_id: Option<String>,
        response: Response,
    },

    /// Any event type not modelled above
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Returns the wire type string, or `"unknown"` for unmodelled events
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::SessionCreated { .. } => "session.created",
            Self::SessionUpdated { .. } => "session.updated",
            Self::ConversationItemCreated { .. } => "conversation.item.created",
            Self::ResponseAudioTranscriptDelta { .. } => "response.audio_transcript.delta",
            Self::ResponseAudioTranscriptDone { .. } => "response.audio_transcript.done",
            Self::InputAudioTranscriptionDelta { .. } => {
                "conversation.item.input_audio_transcription.delta"
            }
            Self::InputAudioTranscriptionCompleted { .. } => {
                "conversation.item.input_audio_transcription.completed"
            }
            Self::ResponseTextDelta { .. } => "response.text.delta",
            Self::ResponseTextDone { .. } => "response.text.done",
            Self::ResponseDone { .. } => "response.done",
            Self::Unknown => "unknown",
        }
    }

    /// Returns the server-assigned event id, if present
    pub fn event_id(&self) -> Option<&str> {
        match self {
            Self::Error { event_id, .. }
            | Self::SessionCreated { event_id, .. }
            | Self::SessionUpdated { event_id, .. }
            | Self::ConversationItemCreated { event_id, .. }
            | Self::ResponseAudioTranscriptDelta { event_id, .. }
            | Self::ResponseAudioTranscriptDone { event_id, .. }
            | Self::InputAudioTranscriptionDelta { event_id, .. }
            | Self::InputAudioTranscriptionCompleted { event_id, .. }
            | Self::ResponseTextDelta { event_id, .. }
            | Self::ResponseTextDone { event_id, .. }
            | Self::ResponseDone { event_id, .. } => event_id.as_deref(),
            Self::Unknown => None,
        }
    }

    /// Check if this event type is modelled by the schema
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Decode a typed event from an already-parsed JSON value
    pub fn from_value(value: &Value) -> Result<Self> {
        Ok(Self::deserialize(value)?)
    }
}

/// An inbound message: the raw JSON as received plus its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event_type: String,
    pub value: Value,
}

impl RawEvent {
    /// Parse a transport message into a JSON object with a string `type`
    pub fn parse(message: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(message)?;
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedEvent("missing string `type` field".to_string()))?
            .to_string();
        Ok(Self { event_type, value })
    }

    /// Server-assigned event id, if present
    pub fn event_id(&self) -> Option<&str> {
        self.value.get("event_id").and_then(Value::as_str)
    }

    /// Decode the typed event
    pub fn decode(&self) -> Result<ServerEvent> {
        ServerEvent::from_value(&self.value)
    }
}
