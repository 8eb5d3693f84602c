//! Transport abstraction for realtime sessions

use async_trait::async_trait;

use crate::error::Result;

/// A peer connection carrying media plus an ordered data channel for JSON
/// events.
///
/// Setup is driven by the session controller in a fixed order:
/// [`connect`](Self::connect), [`create_offer`](Self::create_offer),
/// [`accept_answer`](Self::accept_answer), [`wait_open`](Self::wait_open).
#[async_trait]
pub trait PeerTransport: Send {
    /// Create the connection and its data channel, attaching local audio
    async fn connect(&mut self) -> Result<()>;

    /// Produce the local session description
    async fn create_offer(&mut self) -> Result<String>;

    /// Apply the server's session description
    async fn accept_answer(&mut self, answer_sdp: &str) -> Result<()>;

    /// Wait until the data channel can send
    async fn wait_open(&mut self) -> Result<()>;

    /// Whether the data channel can send right now
    fn is_open(&self) -> bool;

    /// Send one JSON message
    fn send(&mut self, message: &str) -> Result<()>;

    /// Wait for the next inbound message. `None` once the channel closed.
    async fn recv(&mut self) -> Option<String>;

    /// Close the data channel and the connection
    fn close(&mut self);
}
