//! Core types for realtime conversations

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Speaker of a conversation item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Get the role as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Kind of a conversation item
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Message,
    FunctionCall,
    FunctionCallOutput,
    /// Any item type this schema version does not know about, with its tag
    #[serde(untagged)]
    Other(String),
}

/// One piece of content inside a conversation item.
///
/// Content is addressed by its position in the item's content sequence,
/// never by an embedded identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text typed by the user
    InputText {
        #[serde(default)]
        text: String,
    },
    /// Audio captured from the user, with its transcript once known
    InputAudio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    /// Reference to another item
    ItemReference {
        #[serde(default)]
        id: String,
    },
    /// Text produced by the model
    Text {
        #[serde(default)]
        text: String,
    },
    /// Audio produced by the model, with its transcript
    Audio {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    /// Content type this schema version does not know about, kept as received
    #[serde(untagged)]
    Other(Value),
}

impl ContentPart {
    /// Create text content
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create user text content
    pub fn input_text(text: impl Into<String>) -> Self {
        Self::InputText { text: text.into() }
    }

    /// Create a transcript-only audio element suited to the speaker.
    ///
    /// Assistant items carry `audio`, everything else carries `input_audio`.
    pub fn transcript_for(role: Option<Role>, transcript: impl Into<String>) -> Self {
        let transcript = Some(transcript.into());
        match role {
            Some(Role::Assistant) => Self::Audio {
                audio: None,
                transcript,
            },
            _ => Self::InputAudio {
                audio: None,
                transcript,
            },
        }
    }

    /// Wire tag of this content
    pub fn kind(&self) -> &str {
        match self {
            Self::InputText { .. } => "input_text",
            Self::InputAudio { .. } => "input_audio",
            Self::ItemReference { .. } => "item_reference",
            Self::Text { .. } => "text",
            Self::Audio { .. } => "audio",
            Self::Other(raw) => raw.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }

    /// Whether this content carries an audio transcript
    pub fn is_transcript_bearing(&self) -> bool {
        matches!(self, Self::InputAudio { .. } | Self::Audio { .. })
    }

    /// Whether this content carries text
    pub fn is_text_bearing(&self) -> bool {
        matches!(self, Self::Text { .. } | Self::InputText { .. })
    }

    /// Get the transcript, if any
    pub fn transcript(&self) -> Option<&str> {
        match self {
            Self::InputAudio { transcript, .. } | Self::Audio { transcript, .. } => {
                transcript.as_deref()
            }
            _ => None,
        }
    }

    /// Get the text, if this is text content
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } | Self::InputText { text } => Some(text),
            _ => None,
        }
    }

    /// Mutable access to the transcript slot, creating it if the element
    /// has none yet. Returns `None` for content without a transcript.
    pub fn transcript_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::InputAudio { transcript, .. } | Self::Audio { transcript, .. } => {
                Some(transcript.get_or_insert_with(String::new))
            }
            _ => None,
        }
    }

    /// Mutable access to the text of text-bearing content
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Text { text } | Self::InputText { text } => Some(text),
            _ => None,
        }
    }

    /// Human-readable rendering: text, transcript, or nothing
    pub fn display_text(&self) -> Option<&str> {
        self.as_text().or_else(|| self.transcript())
    }
}

/// One turn or message unit within a conversation.
///
/// Fields the reconciliation engine does not touch are kept in `extra` so the
/// item round-trips verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Server-issued identifier, unique within a conversation
    pub id: String,
    /// Item type
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    /// Speaker, for message items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Server-side status (`in_progress`, `completed`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Content sequence; absent until the server streams content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ContentPart>>,
    /// Remaining fields, preserved as received
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationItem {
    /// Create a message item with no content yet
    pub fn message(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            kind: ItemKind::Message,
            role: Some(role),
            status: None,
            content: None,
            extra: Map::new(),
        }
    }

    /// Attach a content sequence
    pub fn with_content(mut self, content: Vec<ContentPart>) -> Self {
        self.content = Some(content);
        self
    }

    /// Whether this is a message item
    pub fn is_message(&self) -> bool {
        self.kind == ItemKind::Message
    }

    /// Content sequence, empty when none has arrived
    pub fn parts(&self) -> &[ContentPart] {
        self.content.as_deref().unwrap_or(&[])
    }

    /// Combined display text of all content
    pub fn text(&self) -> String {
        self.parts()
            .iter()
            .filter_map(|c| c.display_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Negotiated configuration of the current realtime exchange.
///
/// Opaque to the engine: stored and replaced wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescriptor(pub Value);

impl SessionDescriptor {
    /// Wrap a raw JSON record
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Model the server is running, if reported
    pub fn model(&self) -> Option<&str> {
        self.0.get("model").and_then(Value::as_str)
    }

    /// Server-side session id, if reported
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Look up an arbitrary field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Borrow the raw record
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl PartialEq<Value> for SessionDescriptor {
    fn eq(&self, other: &Value) -> bool {
        &self.0 == other
    }
}

/// Summary of a finished response (payload of `response.done`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Items produced by this response
    #[serde(default)]
    pub output: Vec<ConversationItem>,
}

/// Error details carried by the `error` server event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    /// Id of the client event that caused the error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}
