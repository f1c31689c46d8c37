//! Channel capability and event model.
//!
//! Every chat backend (Telegram, and anything else that can send and receive
//! text) exposes its conversations as [`Channel`]s producing [`Event`]s. The
//! bridge consumes and implements the same trait, so bridges nest.

pub mod adapter;
pub mod channel;
pub mod error;
pub mod event;
pub mod queue;

pub use {
    adapter::{AdapterFeed, Backend, ChannelAdapter},
    channel::{Channel, Client, say},
    error::{Error, Result},
    event::{Event, Message, MessageId, User, UserId},
    queue::{EventQueue, QueueSender},
};
