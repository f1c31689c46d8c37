//! Generic channel adapter.
//!
//! A [`Backend`] knows how to talk to one conversation on one chat service:
//! how to turn its native updates into [`Event`]s and how to send. The
//! [`ChannelAdapter`] wraps it with an [`EventQueue`] so the backend's
//! network loop can hand over updates without ever blocking, and exposes the
//! result as a [`Channel`].

use std::sync::atomic::{AtomicBool, Ordering};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{
    Channel, Error, Result,
    event::{Event, Message, MessageId, User},
    queue::{EventQueue, QueueSender},
};

/// Service-specific half of a channel.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Native update type delivered by the service's read loop.
    type Update: Send + 'static;

    fn name(&self) -> &str;

    fn service_name(&self) -> &str;

    /// When the update originated, if the service reports it.
    fn update_time(&self, update: &Self::Update) -> Option<DateTime<Utc>>;

    /// Map a native update to an event.
    ///
    /// `Ok(None)` discards the update: unsupported kinds, or updates without
    /// enough sender information to build a [`User`]. An error terminates the
    /// channel's feed.
    fn map_update(&self, update: Self::Update) -> Result<Option<Event>>;

    /// Send `text`, optionally on behalf of `send_as` and as a reply to `reply_to`.
    async fn send(
        &self,
        send_as: Option<&User>,
        reply_to: Option<&Message>,
        text: &str,
    ) -> Result<Message>;

    async fn edit(&self, id: &MessageId, text: &str) -> Result<MessageId>;

    /// Services without deletion keep this default no-op.
    async fn delete(&self, _id: &MessageId) -> Result<()> {
        Ok(())
    }
}

/// Producer handle used by a backend's read loop to feed one adapter.
pub struct AdapterFeed<U> {
    tx: QueueSender<Result<U>>,
}

impl<U> Clone for AdapterFeed<U> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<U> AdapterFeed<U> {
    /// Queue updates for the adapter. Returns `false` once the feed is closed.
    pub fn deliver(&self, updates: impl IntoIterator<Item = U>) -> bool {
        self.tx.push(updates.into_iter().map(Ok))
    }

    /// Terminate the feed with an error, surfaced by the next `receive`
    /// after the updates already queued.
    pub fn fail(&self, error: Error) {
        self.tx.push([Err(error)]);
        self.tx.close();
    }

    /// End the feed cleanly.
    pub fn close(&self) {
        self.tx.close();
    }
}

/// A [`Channel`] backed by a [`Backend`] and an unbounded update queue.
pub struct ChannelAdapter<B: Backend> {
    backend: B,
    updates: EventQueue<Result<B::Update>>,
    created: DateTime<Utc>,
    terminated: AtomicBool,
}

impl<B: Backend> ChannelAdapter<B> {
    /// Create an adapter whose history starts now.
    pub fn new(backend: B, cancel: CancellationToken) -> Self {
        Self::with_created(backend, cancel, Utc::now())
    }

    /// Create an adapter that discards updates originating before `created`.
    pub fn with_created(backend: B, cancel: CancellationToken, created: DateTime<Utc>) -> Self {
        Self {
            backend,
            updates: EventQueue::new(cancel),
            created,
            terminated: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn feed(&self) -> AdapterFeed<B::Update> {
        AdapterFeed {
            tx: self.updates.sender(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn terminate(&self, error: Error) -> Error {
        warn!(
            channel = self.backend.name(),
            service = self.backend.service_name(),
            error = %error,
            "channel feed terminated"
        );
        self.terminated.store(true, Ordering::SeqCst);
        self.updates.close();
        error
    }
}

#[async_trait]
impl<B: Backend> Channel for ChannelAdapter<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn service_name(&self) -> &str {
        self.backend.service_name()
    }

    async fn receive(&self) -> Result<Option<Event>> {
        loop {
            if self.terminated.load(Ordering::SeqCst) {
                return Ok(None);
            }
            let update = match self.updates.pull().await {
                None => return Ok(None),
                Some(Ok(update)) => update,
                Some(Err(e)) => return Err(self.terminate(e)),
            };
            if let Some(at) = self.backend.update_time(&update)
                && at < self.created
            {
                debug!(
                    channel = self.backend.name(),
                    %at,
                    "ignoring update from before the channel was created"
                );
                continue;
            }
            match self.backend.map_update(update) {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => continue,
                Err(e) => return Err(self.terminate(e)),
            }
        }
    }

    async fn send(&self, text: &str) -> Result<Message> {
        self.backend.send(None, None, text).await
    }

    async fn send_as(&self, send_as: &User, text: &str) -> Result<Message> {
        self.backend.send(Some(send_as), None, text).await
    }

    async fn reply(&self, reply_to: &Message, text: &str) -> Result<Message> {
        self.backend.send(None, Some(reply_to), text).await
    }

    async fn reply_as(&self, send_as: &User, reply_to: &Message, text: &str) -> Result<Message> {
        self.backend.send(Some(send_as), Some(reply_to), text).await
    }

    async fn edit(&self, id: &MessageId, text: &str) -> Result<MessageId> {
        self.backend.edit(id, text).await
    }

    async fn delete(&self, id: &MessageId) -> Result<()> {
        self.backend.delete(id).await
    }
}
