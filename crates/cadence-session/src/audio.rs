//! Local audio capture, playback, and the recorded-audio buffer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::notify::RecordedAudioInfo;

/// A local capture device (microphone)
#[async_trait]
pub trait AudioCapture: Send {
    /// Open the device, producing one chunk per `chunk_duration`
    async fn acquire(&mut self, chunk_duration: Duration) -> Result<()>;

    /// Wait for the next captured chunk. `None` once the device has stopped.
    async fn next_chunk(&mut self) -> Option<Vec<u8>>;

    /// Release the device
    fn release(&mut self);

    /// MIME type of the captured bytes
    fn mime_type(&self) -> &str {
        "audio/webm"
    }
}

/// Sink that plays the remote audio track
#[async_trait]
pub trait AudioPlayback: Send {
    /// Attach to the transport's remote audio
    async fn attach(&mut self) -> Result<()>;

    /// Detach and release the output device
    fn release(&mut self);
}

/// One captured fragment
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

/// All captured audio, concatenated
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl AudioBlob {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Append-only buffer of captured chunks for the current session
#[derive(Debug, Default)]
pub struct RecordedAudio {
    chunks: Vec<AudioChunk>,
    bytes: usize,
}

impl RecordedAudio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored; returns whether the
    /// buffer changed.
    pub fn push(&mut self, data: Vec<u8>) -> bool {
        if data.is_empty() {
            return false;
        }
        self.bytes += data.len();
        self.chunks.push(AudioChunk {
            data,
            captured_at: Utc::now(),
        });
        true
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.bytes = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[AudioChunk] {
        &self.chunks
    }

    pub fn info(&self) -> RecordedAudioInfo {
        RecordedAudioInfo {
            chunks: self.chunks.len(),
            bytes: self.bytes,
        }
    }

    /// Concatenate every chunk, or `None` if nothing was captured
    pub fn export(&self, mime_type: &str) -> Option<AudioBlob> {
        if self.chunks.is_empty() {
            return None;
        }
        let mut data = Vec::with_capacity(self.bytes);
        for chunk in &self.chunks {
            data.extend_from_slice(&chunk.data);
        }
        Some(AudioBlob {
            mime_type: mime_type.to_string(),
            data,
        })
    }
}
