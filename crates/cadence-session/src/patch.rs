//! In-place updates to conversation items.
//!
//! Deltas accumulate onto the addressed content slot; done/completed events
//! replace it with the final value.

use cadence_wire::{ContentPart, ConversationItem};

use crate::conversation::{ContentLookup, Conversation, EventOrigin};

/// One observable mutation made while reconciling an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Session descriptor replaced wholesale
    SessionReplaced,
    /// A new item was appended to the conversation
    ItemAppended { item_id: String },
    /// A content element was synthesized and appended to an item
    ContentCreated { item_id: String, content_index: usize },
    /// An existing content element was extended or overwritten
    ContentUpdated { item_id: String, content_index: usize },
    /// A finished response's content was merged into an existing item
    ContentMerged {
        item_id: String,
        replaced: usize,
        appended: usize,
    },
}

impl Change {
    /// Whether this change touched the conversation (as opposed to the session)
    pub fn is_conversation(&self) -> bool {
        !matches!(self, Change::SessionReplaced)
    }
}

/// The string field of a content element an event writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// `transcript` of `input_audio` / `audio` content
    Transcript,
    /// `text` of `text` / `input_text` content
    Text,
}

impl Slot {
    fn accepts(self, part: &ContentPart) -> bool {
        match self {
            Slot::Transcript => part.is_transcript_bearing(),
            Slot::Text => part.is_text_bearing(),
        }
    }

    fn field_mut(self, part: &mut ContentPart) -> Option<&mut String> {
        match self {
            Slot::Transcript => part.transcript_mut(),
            Slot::Text => part.text_mut(),
        }
    }

    fn synthesize(self, item: &ConversationItem, value: String) -> ContentPart {
        match self {
            Slot::Transcript => ContentPart::transcript_for(item.role, value),
            Slot::Text => ContentPart::text(value),
        }
    }
}

/// Address of a content element: item id plus zero-based position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentTarget<'a> {
    pub item_id: &'a str,
    pub content_index: usize,
}

impl<'a> ContentTarget<'a> {
    pub fn new(item_id: &'a str, content_index: usize) -> Self {
        Self {
            item_id,
            content_index,
        }
    }
}

#[derive(Clone, Copy)]
enum Merge {
    Append,
    Replace,
}

/// Append `delta` to the addressed slot, synthesizing the element if absent.
pub fn apply_delta(
    conversation: &mut Conversation,
    target: ContentTarget<'_>,
    slot: Slot,
    delta: &str,
    origin: EventOrigin<'_>,
) -> Option<Change> {
    write_slot(conversation, target, slot, delta, Merge::Append, origin)
}

/// Overwrite the addressed slot with the final value, synthesizing the
/// element if absent.
pub fn apply_completed(
    conversation: &mut Conversation,
    target: ContentTarget<'_>,
    slot: Slot,
    value: &str,
    origin: EventOrigin<'_>,
) -> Option<Change> {
    write_slot(conversation, target, slot, value, Merge::Replace, origin)
}

/// Apply a completed transcript (`response.audio_transcript.done`,
/// `conversation.item.input_audio_transcription.completed`).
pub fn apply_completed_transcript(
    conversation: &mut Conversation,
    target: ContentTarget<'_>,
    transcript: &str,
    origin: EventOrigin<'_>,
) -> Option<Change> {
    apply_completed(conversation, target, Slot::Transcript, transcript, origin)
}

fn write_slot(
    conversation: &mut Conversation,
    target: ContentTarget<'_>,
    slot: Slot,
    value: &str,
    merge: Merge,
    origin: EventOrigin<'_>,
) -> Option<Change> {
    match conversation.locate_content(target.item_id, target.content_index, origin) {
        ContentLookup::ItemMissing => None,
        ContentLookup::Found { item, content } => {
            let part = &conversation.item_at(item).parts()[content];
            if !slot.accepts(part) {
                tracing::warn!(
                    "Content {} of item '{}' is '{}', expected {:?} content; ignoring {}",
                    content,
                    target.item_id,
                    part.kind(),
                    slot,
                    origin.event_type
                );
                return None;
            }

            let item = conversation.item_mut(item);
            let field = item
                .content
                .as_mut()
                .and_then(|parts| parts.get_mut(content))
                .and_then(|part| slot.field_mut(part))?;
            match merge {
                Merge::Append => field.push_str(value),
                Merge::Replace => {
                    field.clear();
                    field.push_str(value);
                }
            }
            Some(Change::ContentUpdated {
                item_id: target.item_id.to_string(),
                content_index: content,
            })
        }
        ContentLookup::NoContent { item } | ContentLookup::OutOfRange { item, .. } => {
            let item = conversation.item_mut(item);
            let part = slot.synthesize(item, value.to_string());
            let parts = item.content.get_or_insert_with(Vec::new);
            parts.push(part);
            let content_index = parts.len() - 1;
            if content_index != target.content_index {
                tracing::warn!(
                    "Synthesized content for item '{}' landed at index {} instead of {}",
                    target.item_id,
                    content_index,
                    target.content_index
                );
            }
            Some(Change::ContentCreated {
                item_id: target.item_id.to_string(),
                content_index,
            })
        }
    }
}

/// Fold one output entry of a finished response into the conversation.
///
/// Non-message outputs and outputs without content are skipped. An output
/// whose id is unknown is appended as a new item; otherwise its content is
/// merged positionally, not appended: the element at each index is replaced
/// by the server's final version and only indices past the end are appended.
/// A part already built from deltas stays a single part.
pub fn merge_response_output(
    conversation: &mut Conversation,
    output: &ConversationItem,
    origin: EventOrigin<'_>,
) -> Option<Change> {
    if !output.is_message() {
        tracing::debug!(
            "Skipping non-message output '{}' ({:?}) in {}",
            output.id,
            output.kind,
            origin.event_type
        );
        return None;
    }

    let Some(content) = output.content.as_ref().filter(|c| !c.is_empty()) else {
        tracing::debug!(
            "Skipping output '{}' without content in {}",
            output.id,
            origin.event_type
        );
        return None;
    };

    let Some(index) = conversation.position(&output.id) else {
        tracing::debug!(
            "Output '{}' not in conversation; appending it as a new item",
            output.id
        );
        conversation.push(output.clone());
        return Some(Change::ItemAppended {
            item_id: output.id.clone(),
        });
    };

    let item = conversation.item_mut(index);
    let parts = item.content.get_or_insert_with(Vec::new);
    let mut replaced = 0;
    let mut appended = 0;
    for (i, part) in content.iter().enumerate() {
        match parts.get_mut(i) {
            Some(existing) => {
                if existing.kind() != part.kind() {
                    tracing::debug!(
                        "Output '{}' content {} changes type from '{}' to '{}'",
                        output.id,
                        i,
                        existing.kind(),
                        part.kind()
                    );
                }
                *existing = part.clone();
                replaced += 1;
            }
            None => {
                parts.push(part.clone());
                appended += 1;
            }
        }
    }

    Some(Change::ContentMerged {
        item_id: output.id.clone(),
        replaced,
        appended,
    })
}
