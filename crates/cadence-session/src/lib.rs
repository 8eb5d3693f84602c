//! cadence-session: Client-side state for realtime AI conversations
//!
//! This crate reconciles the server's event stream into a session descriptor
//! and an ordered conversation, notifies observers after every change, and
//! drives the session lifecycle over pluggable transport and audio devices.

pub mod audio;
pub mod config;
pub mod conversation;
pub mod error;
pub mod notify;
pub mod patch;
pub mod reconcile;
pub mod session;
pub mod transport;

pub use audio::{AudioBlob, AudioCapture, AudioChunk, AudioPlayback, RecordedAudio};
pub use config::SessionConfig;
pub use conversation::{Conversation, ConversationSnapshot, EventOrigin};
pub use error::{Error, Resource, Result, StartupStage};
pub use notify::{
    Notification, NotificationKind, NotificationSink, Notifier, RecordedAudioInfo, SubscriptionId,
};
pub use patch::Change;
pub use reconcile::Reconciler;
pub use session::{LifecycleState, RealtimeSession};
pub use transport::PeerTransport;
