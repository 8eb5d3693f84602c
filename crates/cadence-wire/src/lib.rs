//! cadence-wire: Wire schema for realtime conversations
//!
//! This crate describes every event and object exchanged with a realtime
//! generative-AI server, plus the HTTP offer/answer exchange used to open a
//! session.

pub mod client;
pub mod error;
pub mod events;
pub mod negotiate;
pub mod types;

pub use client::ClientEvent;
pub use error::{Error, Result};
pub use events::{RawEvent, ServerEvent};
pub use negotiate::{HttpNegotiator, Negotiator};
pub use types::*;
