//! Realtime session controller
//!
//! Owns the collaborators (capture, transport, playback, negotiator) and the
//! reconciled state, and drives startup, the inbound event pump and teardown.

use std::fmt;
use std::sync::Arc;

use cadence_wire::{ClientEvent, Negotiator, SessionDescriptor};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::{
    audio::{AudioBlob, AudioCapture, AudioPlayback, RecordedAudio},
    config::SessionConfig,
    conversation::ConversationSnapshot,
    error::{Error, Resource, Result, StartupStage},
    notify::{Notification, NotificationKind, NotificationSink, Notifier, SubscriptionId},
    patch::Change,
    reconcile::Reconciler,
    transport::PeerTransport,
};

/// Lifecycle of a [`RealtimeSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
    /// A startup stage failed; teardown is in progress
    Errored,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Starting => "starting",
            LifecycleState::Active => "active",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Errored => "errored",
        })
    }
}

/// Which collaborators currently hold resources
#[derive(Debug, Clone, Copy, Default)]
struct Acquired {
    capture: bool,
    transport: bool,
    playback: bool,
}

impl Acquired {
    fn any(&self) -> bool {
        self.capture || self.transport || self.playback
    }
}

enum Inbound {
    Message(Option<String>),
    Chunk(Option<Vec<u8>>),
}

/// A realtime conversation session.
///
/// All reconciliation runs on the task that calls [`pump`](Self::pump) or
/// [`process_message`](Self::process_message); handlers never interleave.
pub struct RealtimeSession {
    config: SessionConfig,
    notifier: Arc<Notifier>,
    reconciler: Reconciler,
    recorded: RecordedAudio,
    transport: Box<dyn PeerTransport>,
    negotiator: Arc<dyn Negotiator>,
    capture: Option<Box<dyn AudioCapture>>,
    playback: Option<Box<dyn AudioPlayback>>,
    state: LifecycleState,
    acquired: Acquired,
    capture_finished: bool,
}

impl RealtimeSession {
    /// Create an idle session
    pub fn new(
        config: SessionConfig,
        transport: Box<dyn PeerTransport>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Self {
        Self {
            config,
            notifier: Arc::new(Notifier::new()),
            reconciler: Reconciler::new(),
            recorded: RecordedAudio::new(),
            transport,
            negotiator,
            capture: None,
            playback: None,
            state: LifecycleState::Idle,
            acquired: Acquired::default(),
            capture_finished: false,
        }
    }

    /// Attach the local capture device
    pub fn with_capture(mut self, capture: Box<dyn AudioCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Attach a playback sink for remote audio
    pub fn with_playback(mut self, playback: Box<dyn AudioPlayback>) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Shared notifier, for registering observers from other owners
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Register an observer for one notification kind
    pub fn on(
        &self,
        kind: NotificationKind,
        callback: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.notifier.on(kind, callback)
    }

    /// Remove an observer
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.notifier.off(id)
    }

    /// Receive every notification through a broadcast channel
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Immutable snapshot of the conversation
    pub fn conversation(&self) -> ConversationSnapshot {
        self.reconciler.conversation().snapshot()
    }

    /// Current session descriptor
    pub fn session(&self) -> Option<&SessionDescriptor> {
        self.reconciler.session()
    }

    pub fn has_recorded_audio(&self) -> bool {
        !self.recorded.is_empty()
    }

    /// Concatenate all captured audio into one blob
    pub fn export_recorded_audio(&self) -> Result<AudioBlob> {
        let mime_type = self
            .capture
            .as_ref()
            .map(|c| c.mime_type())
            .unwrap_or("audio/webm");
        self.recorded.export(mime_type).ok_or(Error::NoRecordedAudio)
    }

    /// Start the session.
    ///
    /// Stages run in order: capture, transport (and playback), negotiation,
    /// channel open. If any stage fails, everything acquired so far is
    /// released, the session returns to idle, and the stage's error is
    /// returned inside [`Error::Startup`].
    pub async fn start(&mut self) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(Error::InvalidState(self.state));
        }
        if self.capture.is_none() {
            return Err(Error::unavailable(
                Resource::Capture,
                "no capture device configured",
            ));
        }

        tracing::info!("Starting realtime session with model {}", self.config.model);
        self.state = LifecycleState::Starting;
        self.reset_state();

        match self.run_startup().await {
            Ok(()) => {
                self.state = LifecycleState::Active;
                tracing::info!("Realtime session active");
                Ok(())
            }
            Err((stage, source)) => {
                tracing::warn!("Session start failed during {}: {}", stage, source);
                self.state = LifecycleState::Errored;
                self.teardown();
                self.state = LifecycleState::Idle;
                Err(Error::Startup {
                    stage,
                    source: Box::new(source),
                })
            }
        }
    }

    async fn run_startup(&mut self) -> std::result::Result<(), (StartupStage, Error)> {
        let Some(capture) = self.capture.as_mut() else {
            return Err((
                StartupStage::Capture,
                Error::unavailable(Resource::Capture, "no capture device configured"),
            ));
        };
        capture
            .acquire(self.config.chunk_duration)
            .await
            .map_err(at(StartupStage::Capture))?;
        self.acquired.capture = true;

        self.transport
            .connect()
            .await
            .map_err(at(StartupStage::Transport))?;
        self.acquired.transport = true;

        match self.playback.as_mut() {
            Some(playback) => {
                playback
                    .attach()
                    .await
                    .map_err(at(StartupStage::Playback))?;
                self.acquired.playback = true;
            }
            None => tracing::debug!("No playback sink attached; remote audio is discarded"),
        }

        let offer = self
            .transport
            .create_offer()
            .await
            .map_err(at(StartupStage::Negotiation))?;
        let answer = self
            .negotiator
            .negotiate(&offer, &self.config.model)
            .await
            .map_err(|e| (StartupStage::Negotiation, Error::Wire(e)))?;
        self.transport
            .accept_answer(&answer)
            .await
            .map_err(at(StartupStage::Negotiation))?;

        self.transport
            .wait_open()
            .await
            .map_err(at(StartupStage::ChannelOpen))?;
        Ok(())
    }

    /// Stop the session, releasing whatever is held. Safe to call at any
    /// time, any number of times.
    pub async fn stop(&mut self) {
        if !self.acquired.any() && self.reconciler.session().is_none() {
            tracing::debug!("Stop requested with nothing to release");
            self.state = LifecycleState::Idle;
            return;
        }

        tracing::info!("Stopping realtime session");
        self.state = LifecycleState::Stopping;
        self.teardown();
        self.state = LifecycleState::Idle;
    }

    fn teardown(&mut self) {
        if self.acquired.capture {
            if let Some(capture) = self.capture.as_mut() {
                capture.release();
            }
            self.acquired.capture = false;
        }
        if self.acquired.transport {
            self.transport.close();
            self.acquired.transport = false;
        }
        if self.acquired.playback {
            if let Some(playback) = self.playback.as_mut() {
                playback.release();
            }
            self.acquired.playback = false;
        }

        if self.reconciler.clear_session().is_some() {
            self.notifier.emit(Notification::SessionCleared);
        }
    }

    fn reset_state(&mut self) {
        self.capture_finished = false;
        if self.reconciler.reset_conversation() {
            self.notifier.emit(Notification::ConversationChanged(
                self.reconciler.conversation().snapshot(),
            ));
        }
        if !self.recorded.is_empty() {
            self.recorded.clear();
            self.notifier
                .emit(Notification::RecordedAudioChanged(self.recorded.info()));
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.state == LifecycleState::Active && self.transport.is_open() {
            Ok(())
        } else {
            Err(Error::TransportNotReady)
        }
    }

    /// Send a typed client event
    pub fn send(&mut self, event: &ClientEvent) -> Result<()> {
        self.ensure_ready()?;
        let message = event.to_json()?;
        tracing::debug!("Sending {} ({})", event.event_type(), event.event_id());
        self.transport.send(&message)
    }

    /// Send a caller-built JSON event verbatim
    pub fn send_raw(&mut self, event: &Value) -> Result<()> {
        self.ensure_ready()?;
        let message = serde_json::to_string(event).map_err(cadence_wire::Error::from)?;
        self.transport.send(&message)
    }

    /// Reconcile one raw inbound message
    pub fn process_message(&mut self, message: &str) -> Vec<Change> {
        if self.state != LifecycleState::Active {
            tracing::debug!("Ignoring inbound message while {}", self.state);
            return Vec::new();
        }
        self.reconciler
            .handle_message(message, &*self.notifier)
    }

    fn record_chunk(&mut self, data: Vec<u8>) {
        if self.recorded.push(data) {
            self.notifier
                .emit(Notification::RecordedAudioChanged(self.recorded.info()));
        }
    }

    /// Wait for one inbound message or captured chunk and process it.
    ///
    /// Returns `false` once the transport's channel has closed.
    pub async fn pump(&mut self) -> Result<bool> {
        if self.state != LifecycleState::Active {
            return Err(Error::InvalidState(self.state));
        }

        let capture_live = self.acquired.capture && !self.capture_finished;
        let inbound = {
            let transport = &mut self.transport;
            let capture = self.capture.as_mut();
            tokio::select! {
                biased;
                message = transport.recv() => Inbound::Message(message),
                chunk = next_chunk(capture, capture_live) => Inbound::Chunk(chunk),
            }
        };

        match inbound {
            Inbound::Message(Some(message)) => {
                self.process_message(&message);
                Ok(true)
            }
            Inbound::Message(None) => {
                tracing::info!("Data channel closed");
                Ok(false)
            }
            Inbound::Chunk(Some(data)) => {
                self.record_chunk(data);
                Ok(true)
            }
            Inbound::Chunk(None) => {
                tracing::debug!("Audio capture finished");
                self.capture_finished = true;
                Ok(true)
            }
        }
    }

    /// Pump until the transport closes
    pub async fn run(&mut self) -> Result<()> {
        while self.pump().await? {}
        Ok(())
    }
}

fn at(stage: StartupStage) -> impl FnOnce(Error) -> (StartupStage, Error) {
    move |e| (stage, e)
}

async fn next_chunk(capture: Option<&mut Box<dyn AudioCapture>>, live: bool) -> Option<Vec<u8>> {
    match capture {
        Some(capture) if live => capture.next_chunk().await,
        _ => std::future::pending().await,
    }
}
