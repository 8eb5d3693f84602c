//! Replaying recorded server event logs through a full session

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_session::{
    AudioCapture, ConversationSnapshot, PeerTransport, RealtimeSession, Result, SessionConfig,
};
use cadence_wire::Negotiator;

/// Transport that delivers a fixed list of server messages, then closes.
pub struct ReplayTransport {
    pending: VecDeque<String>,
    open: bool,
}

impl ReplayTransport {
    /// One message per non-empty line. Lines starting with `#` are skipped.
    pub fn from_jsonl(source: &str) -> Self {
        let pending = source
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect();
        Self {
            pending,
            open: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl PeerTransport for ReplayTransport {
    async fn connect(&mut self) -> Result<()> {
        tracing::debug!("Replay transport loaded {} messages", self.pending.len());
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<String> {
        Ok("v=0\r\ns=cadence-replay\r\n".to_string())
    }

    async fn accept_answer(&mut self, _answer_sdp: &str) -> Result<()> {
        Ok(())
    }

    async fn wait_open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn send(&mut self, message: &str) -> Result<()> {
        tracing::debug!("Replay transport discarding outbound message: {}", message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<String> {
        if !self.open {
            return None;
        }
        self.pending.pop_front()
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Capture device that records nothing
#[derive(Default)]
pub struct SilentCapture;

#[async_trait]
impl AudioCapture for SilentCapture {
    async fn acquire(&mut self, chunk_duration: Duration) -> Result<()> {
        tracing::debug!("Silent capture acquired ({:?} chunks)", chunk_duration);
        Ok(())
    }

    async fn next_chunk(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn release(&mut self) {}
}

/// Negotiator that answers every offer with the offer itself
pub struct LoopbackNegotiator;

#[async_trait]
impl Negotiator for LoopbackNegotiator {
    async fn negotiate(&self, offer_sdp: &str, _model: &str) -> cadence_wire::Result<String> {
        Ok(offer_sdp.to_string())
    }
}

/// Build a session that replays `source`
pub fn session(config: SessionConfig, source: &str) -> RealtimeSession {
    RealtimeSession::new(
        config,
        Box::new(ReplayTransport::from_jsonl(source)),
        Arc::new(LoopbackNegotiator),
    )
    .with_capture(Box::new(SilentCapture))
}

/// Start `session`, reconcile every message, stop, and return the final
/// conversation
pub async fn run(session: &mut RealtimeSession) -> Result<ConversationSnapshot> {
    session.start().await?;
    let result = session.run().await;
    session.stop().await;
    result?;
    Ok(session.conversation())
}

/// Render a conversation as one line per item
pub fn render(conversation: &ConversationSnapshot) -> String {
    conversation
        .iter()
        .map(|item| {
            let role = item.role.map(|r| r.as_str()).unwrap_or("-");
            format!("{} [{}] {}", item.id, role, item.text())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
