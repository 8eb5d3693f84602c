//! Conversation state and item/content lookup.

use std::ops::Deref;
use std::sync::Arc;

use cadence_wire::{ContentPart, ConversationItem, ServerEvent};

/// Identifies the inbound event a lookup is performed for, so misses can be
/// traced back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventOrigin<'a> {
    pub event_type: &'a str,
    pub event_id: Option<&'a str>,
}

impl<'a> EventOrigin<'a> {
    pub fn new(event_type: &'a str, event_id: Option<&'a str>) -> Self {
        Self {
            event_type,
            event_id,
        }
    }

    /// Origin of a decoded server event
    pub fn of(event: &'a ServerEvent) -> Self {
        Self::new(event.event_type(), event.event_id())
    }

    fn id(&self) -> &'a str {
        self.event_id.unwrap_or("-")
    }
}

/// Outcome of resolving `(item_id, content_index)` against the current
/// content sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLookup {
    /// Both item and content slot exist
    Found { item: usize, content: usize },
    /// Item exists but has no content sequence yet
    NoContent { item: usize },
    /// Item exists but the index is past the end of its content
    OutOfRange { item: usize, len: usize },
    /// No item with that id
    ItemMissing,
}

impl ContentLookup {
    /// Position of the item, if it was found
    pub fn item_index(&self) -> Option<usize> {
        match *self {
            ContentLookup::Found { item, .. }
            | ContentLookup::NoContent { item }
            | ContentLookup::OutOfRange { item, .. } => Some(item),
            ContentLookup::ItemMissing => None,
        }
    }
}

/// Borrowed result of [`Conversation::find_item_content`]
#[derive(Debug, Clone, Copy)]
pub struct ItemContent<'a> {
    pub item: Option<&'a ConversationItem>,
    pub content: Option<&'a ContentPart>,
}

/// Immutable view of the conversation at one point in time.
///
/// Items are shared with the live conversation; later patches copy the item
/// they touch, so a snapshot never changes after it is taken.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot(Arc<Vec<Arc<ConversationItem>>>);

impl ConversationSnapshot {
    /// Find an item by id
    pub fn get(&self, item_id: &str) -> Option<&ConversationItem> {
        self.0.iter().find(|i| i.id == item_id).map(|i| i.as_ref())
    }

    /// Item ids in conversation order
    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|i| i.id.as_str()).collect()
    }
}

impl Deref for ConversationSnapshot {
    type Target = [Arc<ConversationItem>];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Ordered conversation items, in arrival order of their creation events.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    items: Vec<Arc<ConversationItem>>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate items in order
    pub fn iter(&self) -> impl Iterator<Item = &ConversationItem> {
        self.items.iter().map(|i| i.as_ref())
    }

    /// Find an item by id without logging a miss
    pub fn get(&self, item_id: &str) -> Option<&ConversationItem> {
        self.position(item_id).map(|idx| self.items[idx].as_ref())
    }

    /// Whether an item with this id exists
    pub fn contains(&self, item_id: &str) -> bool {
        self.position(item_id).is_some()
    }

    /// Take an immutable snapshot
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot(Arc::new(self.items.clone()))
    }

    /// Find an item by id. A miss is logged against `origin`.
    pub fn find_item(&self, item_id: &str, origin: EventOrigin<'_>) -> Option<&ConversationItem> {
        self.locate_item(item_id, origin)
            .map(|idx| self.items[idx].as_ref())
    }

    /// Find an item and the content element at `content_index`.
    pub fn find_item_content(
        &self,
        item_id: &str,
        content_index: usize,
        origin: EventOrigin<'_>,
    ) -> ItemContent<'_> {
        match self.locate_content(item_id, content_index, origin) {
            ContentLookup::Found { item, content } => {
                let item = self.items[item].as_ref();
                ItemContent {
                    item: Some(item),
                    content: item.parts().get(content),
                }
            }
            ContentLookup::NoContent { item } | ContentLookup::OutOfRange { item, .. } => {
                ItemContent {
                    item: Some(self.items[item].as_ref()),
                    content: None,
                }
            }
            ContentLookup::ItemMissing => ItemContent {
                item: None,
                content: None,
            },
        }
    }

    pub(crate) fn locate_item(&self, item_id: &str, origin: EventOrigin<'_>) -> Option<usize> {
        let found = self.position(item_id);
        if found.is_none() {
            tracing::warn!(
                "Conversation item '{}' not found while handling {} (event {})",
                item_id,
                origin.event_type,
                origin.id()
            );
        }
        found
    }

    pub(crate) fn locate_content(
        &self,
        item_id: &str,
        content_index: usize,
        origin: EventOrigin<'_>,
    ) -> ContentLookup {
        let Some(item) = self.locate_item(item_id, origin) else {
            return ContentLookup::ItemMissing;
        };

        match self.items[item].content.as_ref() {
            None => {
                tracing::debug!(
                    "Item '{}' has no content yet while handling {} (event {})",
                    item_id,
                    origin.event_type,
                    origin.id()
                );
                ContentLookup::NoContent { item }
            }
            Some(content) if content_index >= content.len() => {
                tracing::warn!(
                    "Content index {} out of range for item '{}' ({} elements) while handling {} (event {})",
                    content_index,
                    item_id,
                    content.len(),
                    origin.event_type,
                    origin.id()
                );
                ContentLookup::OutOfRange {
                    item,
                    len: content.len(),
                }
            }
            Some(_) => ContentLookup::Found {
                item,
                content: content_index,
            },
        }
    }

    pub(crate) fn item_at(&self, index: usize) -> &ConversationItem {
        self.items[index].as_ref()
    }

    /// Mutable access to an item, copying it first if a snapshot shares it
    pub(crate) fn item_mut(&mut self, index: usize) -> &mut ConversationItem {
        Arc::make_mut(&mut self.items[index])
    }

    pub(crate) fn push(&mut self, item: ConversationItem) {
        self.items.push(Arc::new(item));
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn position(&self, item_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id == item_id)
    }
}
