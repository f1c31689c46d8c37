use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    Result,
    event::{Event, Message, MessageId, User},
};

/// A handle to one conversational endpoint: a room, group, or DM on a backend.
///
/// Implementations that do not support an operation (editing, deleting)
/// treat it as a successful no-op rather than an error.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name, e.g. the group title.
    fn name(&self) -> &str;

    /// Name of the underlying chat service, e.g. "Telegram".
    fn service_name(&self) -> &str;

    /// Receive the next event, suspending until one is available.
    ///
    /// Returns `Ok(None)` once the channel's feed is exhausted.
    async fn receive(&self) -> Result<Option<Event>>;

    /// Send text and return the sent message.
    async fn send(&self, text: &str) -> Result<Message>;

    /// Send text on behalf of another user, possibly from another service.
    async fn send_as(&self, send_as: &User, text: &str) -> Result<Message>;

    /// Reply to a message. Services without replies may treat this as a send.
    async fn reply(&self, reply_to: &Message, text: &str) -> Result<Message>;

    /// Reply to a message on behalf of another user.
    async fn reply_as(&self, send_as: &User, reply_to: &Message, text: &str) -> Result<Message>;

    /// Edit a sent message, returning the identifier of the edited message.
    async fn edit(&self, id: &MessageId, text: &str) -> Result<MessageId>;

    /// Delete a message.
    async fn delete(&self, id: &MessageId) -> Result<()>;
}

/// A connection to a chat service, from which channels are joined.
#[async_trait]
pub trait Client: Send + Sync {
    /// Join a channel by its service-specific identifier.
    ///
    /// Some services keep bots in their channels across reconnects; joining
    /// such a channel just returns its handle.
    async fn join(&self, channel: &str) -> Result<Arc<dyn Channel>>;

    /// Close the client, reporting any error encountered while it ran.
    async fn close(&self) -> Result<()>;
}

/// Send `text` to a channel, discarding the returned message.
pub async fn say(channel: &dyn Channel, text: &str) -> Result<()> {
    channel.send(text).await.map(|_| ())
}
