//! Error types for cadence-session

use std::fmt;

use thiserror::Error;

use crate::session::LifecycleState;

/// Result type alias using cadence-session Error
pub type Result<T> = std::result::Result<T, Error>;

/// A collaborator the controller depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Capture,
    Transport,
    Playback,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Capture => "audio capture",
            Resource::Transport => "transport",
            Resource::Playback => "playback sink",
        })
    }
}

/// Stage of session startup, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupStage {
    Capture,
    Transport,
    Playback,
    Negotiation,
    ChannelOpen,
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartupStage::Capture => "audio capture",
            StartupStage::Transport => "transport setup",
            StartupStage::Playback => "playback attach",
            StartupStage::Negotiation => "session negotiation",
            StartupStage::ChannelOpen => "channel open",
        })
    }
}

/// Errors surfaced to callers of the session controller
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer (encoding, negotiation)
    #[error(transparent)]
    Wire(#[from] cadence_wire::Error),

    /// A required collaborator is missing or failed to provide its resource
    #[error("{resource} unavailable: {reason}")]
    ResourceUnavailable { resource: Resource, reason: String },

    /// Startup failed; every resource acquired so far has been released
    #[error("session start failed during {stage}: {source}")]
    Startup {
        stage: StartupStage,
        #[source]
        source: Box<Error>,
    },

    /// A client event was sent before the channel opened
    #[error("transport is not ready to send")]
    TransportNotReady,

    /// The operation is not valid in the current lifecycle state
    #[error("operation not allowed while {0}")]
    InvalidState(LifecycleState),

    /// Nothing was captured to export
    #[error("no recorded audio")]
    NoRecordedAudio,
}

impl Error {
    /// Create a resource-unavailable error
    pub fn unavailable(resource: Resource, reason: impl Into<String>) -> Self {
        Self::ResourceUnavailable {
            resource,
            reason: reason.into(),
        }
    }

    /// The stage that failed, for startup errors
    pub fn startup_stage(&self) -> Option<StartupStage> {
        match self {
            Error::Startup { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The error that caused a startup failure, or `self` otherwise
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Startup { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
