//! Relay engine bridging multiple chat channels into one logical channel.
//!
//! Each bridged channel is polled by its own task; a single relay task
//! rebroadcasts every event to the other channels, records where each copy
//! landed in a bounded [`CorrelationLog`](correlation::CorrelationLog), and
//! republishes the event through [`Bridge::receive`](chatrelay_channels::Channel::receive).

mod bridge;
pub mod correlation;
pub mod error;
mod poller;
mod relay;

pub use {
    bridge::{Bridge, BridgeOptions},
    correlation::{CorrelationLog, DEFAULT_HISTORY, Endpoint, LogEntry, MessageCopy},
    error::{Error, Result},
};
