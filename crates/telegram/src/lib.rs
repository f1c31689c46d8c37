//! Telegram backend for chatrelay.
//!
//! A [`TelegramClient`] long-polls the Bot API for one bot account and
//! exposes each joined group as a [`chatrelay_channels::Channel`].

pub mod bot;
pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod media;
pub mod outbound;
mod state;

pub use {
    chat::{ChatUpdate, TelegramChat},
    client::TelegramClient,
    config::TelegramAccountConfig,
    error::{Error, Result},
    media::{MediaProxy, ProfilePhotos},
};
