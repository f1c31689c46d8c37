//! The bridge: a [`Channel`] that relays between other channels.
//!
//! Events arriving on any bridged channel are relayed to all the others and
//! then published to [`Bridge::receive`]. Sends made directly on the bridge
//! go to every bridged channel, so a bridge can itself be bridged.

use std::sync::{Arc, Mutex};

use {
    async_trait::async_trait,
    chatrelay_channels::{Channel, Event, EventQueue, Message, MessageId, QueueSender, User},
    tokio::{
        sync::{Mutex as AsyncMutex, mpsc},
        task::JoinHandle,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{bridge as bridge_metrics, counter, gauge, histogram, labels};

use crate::{
    correlation::{CorrelationLog, DEFAULT_HISTORY, Endpoint, LogEntry, MessageCopy},
    error::{Error, Result},
    poller::{self, Origin},
    relay::{self, Target},
};

/// Capacity of the intake shared by all pollers.
const INTAKE_CAPACITY: usize = 100;

const SERVICE_NAME: &str = "bridge";

/// Bridge construction options.
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Name reported by [`Channel::name`] and used for the bridge's own user.
    pub name: String,
    /// Number of relay operations remembered for reply/edit/delete targeting.
    pub history: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            name: SERVICE_NAME.to_string(),
            history: DEFAULT_HISTORY,
        }
    }
}

struct State {
    next_id: u64,
    log: CorrelationLog,
}

/// State shared by the relay task and the direct-send path.
pub(crate) struct Shared {
    name: String,
    channels: Vec<Arc<dyn Channel>>,
    // Held only for lookups, appends, and id allocation; never across `.await`.
    state: Mutex<State>,
}

impl Shared {
    pub(crate) fn channel(&self, index: usize) -> &dyn Channel {
        self.channels[index].as_ref()
    }

    pub(crate) fn targets_except(&self, exclude: Endpoint) -> Vec<Target<'_>> {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, ch)| Target {
                endpoint: Endpoint::Bridged(i),
                channel: ch.as_ref(),
            })
            .filter(|t| t.endpoint != exclude)
            .collect()
    }

    pub(crate) fn find(&self, on: Endpoint, id: &MessageId) -> Option<Arc<LogEntry>> {
        self.lock().log.find(on, id)
    }

    pub(crate) fn record(&self, entry: LogEntry) {
        let mut state = self.lock();
        let evicted = state.log.append(entry);
        if evicted > 0 {
            debug!(evicted, "correlation log full, evicted oldest entries");
        }
        #[cfg(feature = "metrics")]
        gauge!(bridge_metrics::LOG_ENTRIES).set(state.log.len() as f64);
    }

    fn next_id(&self) -> MessageId {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        MessageId::new(id.to_string())
    }

    fn me(&self) -> User {
        User {
            id: SERVICE_NAME.into(),
            nick: self.name.clone(),
            full_name: self.name.clone(),
            display_name: self.name.clone(),
            photo_url: None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A [`Channel`] bridging a fixed set of other channels.
pub struct Bridge {
    shared: Arc<Shared>,
    events: EventQueue<Event>,
    closed: CancellationToken,
    relay_task: AsyncMutex<Option<JoinHandle<Result<()>>>>,
}

impl Bridge {
    /// Start bridging `channels` with default options.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(channels: Vec<Arc<dyn Channel>>) -> Self {
        Self::with_options(channels, BridgeOptions::default())
    }

    pub fn with_options(channels: Vec<Arc<dyn Channel>>, options: BridgeOptions) -> Self {
        let cancel = CancellationToken::new();
        let closed = CancellationToken::new();
        let shared = Arc::new(Shared {
            name: options.name,
            channels,
            state: Mutex::new(State {
                next_id: 0,
                log: CorrelationLog::new(options.history),
            }),
        });
        let events = EventQueue::new(cancel.clone());

        let (intake_tx, intake_rx) = mpsc::channel(INTAKE_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(1);
        for (index, channel) in shared.channels.iter().enumerate() {
            tokio::spawn(poller::poll(
                index,
                Arc::clone(channel),
                intake_tx.clone(),
                error_tx.clone(),
                cancel.clone(),
            ));
        }

        info!(
            bridge = %shared.name,
            channels = shared.channels.len(),
            "bridge started"
        );

        let relay_task = tokio::spawn(multiplex(Multiplexer {
            shared: Arc::clone(&shared),
            intake: intake_rx,
            errors: error_rx,
            events: events.sender(),
            closed: closed.clone(),
            cancel,
        }));

        Self {
            shared,
            events,
            closed,
            relay_task: AsyncMutex::new(Some(relay_task)),
        }
    }

    /// The bridged channels, in the order given at construction.
    pub fn channels(&self) -> &[Arc<dyn Channel>] {
        &self.shared.channels
    }

    /// Stop bridging and report the error that ended the bridge, if any.
    ///
    /// A clean close returns `Ok(())`. Closing twice returns [`Error::Closed`].
    pub async fn close(&self) -> Result<()> {
        self.closed.cancel();
        let Some(task) = self.relay_task.lock().await.take() else {
            return Err(Error::Closed);
        };
        task.await?
    }

    async fn send_local(
        &self,
        send_as: Option<&User>,
        reply_to: Option<&Message>,
        text: &str,
    ) -> Result<Message> {
        let entry = reply_to.and_then(|m| self.shared.find(Endpoint::Local, &m.id));
        let targets = self.shared.targets_except(Endpoint::Local);
        let mut copies = relay::broadcast(&targets, send_as, entry.as_deref(), text).await?;

        let msg = Message {
            id: self.shared.next_id(),
            from: self.shared.me(),
            text: text.to_string(),
        };
        copies.push(MessageCopy {
            to: Endpoint::Local,
            message: msg.clone(),
        });
        self.shared.record(LogEntry::new(Endpoint::Local, copies));
        Ok(msg)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl Channel for Bridge {
    fn name(&self) -> &str {
        &self.shared.name
    }

    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    /// Next event from any bridged channel, after it has been relayed.
    ///
    /// Returns `Ok(None)` once the bridge has stopped; call
    /// [`Bridge::close`] to learn why.
    async fn receive(&self) -> chatrelay_channels::Result<Option<Event>> {
        Ok(self.events.pull().await)
    }

    async fn send(&self, text: &str) -> chatrelay_channels::Result<Message> {
        Ok(self.send_local(None, None, text).await?)
    }

    async fn send_as(&self, send_as: &User, text: &str) -> chatrelay_channels::Result<Message> {
        Ok(self.send_local(Some(send_as), None, text).await?)
    }

    async fn reply(&self, reply_to: &Message, text: &str) -> chatrelay_channels::Result<Message> {
        Ok(self.send_local(None, Some(reply_to), text).await?)
    }

    async fn reply_as(
        &self,
        send_as: &User,
        reply_to: &Message,
        text: &str,
    ) -> chatrelay_channels::Result<Message> {
        Ok(self.send_local(Some(send_as), Some(reply_to), text).await?)
    }

    /// No-op: the bridge has no copy of its own to edit.
    async fn edit(&self, id: &MessageId, _text: &str) -> chatrelay_channels::Result<MessageId> {
        Ok(id.clone())
    }

    /// No-op, like [`edit`](Self::edit).
    async fn delete(&self, _id: &MessageId) -> chatrelay_channels::Result<()> {
        Ok(())
    }
}

struct Multiplexer {
    shared: Arc<Shared>,
    intake: mpsc::Receiver<Origin>,
    errors: mpsc::Receiver<Error>,
    events: QueueSender<Event>,
    closed: CancellationToken,
    cancel: CancellationToken,
}

/// The relay loop. Only one relay operation runs at a time, in intake order.
async fn multiplex(mut mux: Multiplexer) -> Result<()> {
    let result = loop {
        tokio::select! {
            biased;
            () = mux.closed.cancelled() => break Ok(()),
            Some(err) = mux.errors.recv() => break Err(err),
            Some(Origin { index, event }) = mux.intake.recv() => {
                #[cfg(feature = "metrics")]
                let start = std::time::Instant::now();

                if let Err(e) = relay::relay(&mux.shared, index, &event).await {
                    break Err(e);
                }

                #[cfg(feature = "metrics")]
                {
                    counter!(bridge_metrics::EVENTS_RELAYED_TOTAL, labels::KIND => event.kind())
                        .increment(1);
                    histogram!(bridge_metrics::RELAY_DURATION_SECONDS)
                        .record(start.elapsed().as_secs_f64());
                }

                mux.events.push([event]);
            },
        }
    };

    // Stops the pollers and drops events not yet received.
    mux.cancel.cancel();
    mux.events.close();

    match &result {
        Ok(()) => info!(bridge = %mux.shared.name, "bridge closed"),
        Err(e) => warn!(bridge = %mux.shared.name, error = %e, "bridge stopped on error"),
    }
    result
}
