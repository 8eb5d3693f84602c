//! Typed notifications and their synchronous fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cadence_wire::SessionDescriptor;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::conversation::ConversationSnapshot;

/// Notification channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    ServerEvent,
    SessionCreated,
    SessionUpdated,
    SessionCleared,
    ConversationChanged,
    RecordedAudioChanged,
}

/// Summary of the local capture buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordedAudioInfo {
    pub chunks: usize,
    pub bytes: usize,
}

/// A state transition observers are told about
#[derive(Debug, Clone)]
pub enum Notification {
    /// Every parsed inbound message, verbatim
    ServerEvent(Arc<Value>),
    SessionCreated(SessionDescriptor),
    SessionUpdated(SessionDescriptor),
    /// Teardown discarded the session descriptor
    SessionCleared,
    /// Full conversation after the change
    ConversationChanged(ConversationSnapshot),
    RecordedAudioChanged(RecordedAudioInfo),
}

impl Notification {
    /// Channel this notification is delivered on
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::ServerEvent(_) => NotificationKind::ServerEvent,
            Notification::SessionCreated(_) => NotificationKind::SessionCreated,
            Notification::SessionUpdated(_) => NotificationKind::SessionUpdated,
            Notification::SessionCleared => NotificationKind::SessionCleared,
            Notification::ConversationChanged(_) => NotificationKind::ConversationChanged,
            Notification::RecordedAudioChanged(_) => NotificationKind::RecordedAudioChanged,
        }
    }
}

/// Receiver of notifications produced while reconciling events
pub trait NotificationSink {
    fn emit(&self, notification: Notification);
}

/// Handle returned by [`Notifier::on`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

struct Observer {
    id: SubscriptionId,
    kind: NotificationKind,
    callback: Callback,
}

/// Fans notifications out to registered observers, synchronously and in
/// emission order, then to broadcast subscribers.
pub struct Notifier {
    observers: Mutex<Vec<Observer>>,
    next_id: AtomicU64,
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            tx,
        }
    }

    /// Register `callback` for one notification kind.
    ///
    /// Callbacks run on the emitting task before the engine continues, and
    /// may subscribe or unsubscribe from within.
    pub fn on(
        &self,
        kind: NotificationKind,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push(Observer {
            id,
            kind,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove an observer. Returns `false` if it was not registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|o| o.id != id);
        observers.len() != before
    }

    /// Subscribe to every notification through a broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Number of registered callbacks
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationSink for Notifier {
    fn emit(&self, notification: Notification) {
        let kind = notification.kind();
        let callbacks: Vec<Callback> = self
            .observers
            .lock()
            .iter()
            .filter(|o| o.kind == kind)
            .map(|o| Arc::clone(&o.callback))
            .collect();

        for callback in callbacks {
            callback(&notification);
        }

        // No receivers is fine
        let _ = self.tx.send(notification);
    }
}
