//! Unbounded, order-preserving event queue.
//!
//! Producers (typically a backend's network read loop) push batches without
//! ever waiting on the consumer. A forwarding task moves the pending batch out
//! of a single intake slot and hands items one at a time to the consumer, so
//! pushes that land while the consumer is slow coalesce into one batch.

use std::sync::{Arc, Mutex};

use {
    tokio::sync::{Mutex as AsyncMutex, Notify, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::trace,
};

struct Intake<T> {
    pending: Vec<T>,
    closed: bool,
}

struct Shared<T> {
    intake: Mutex<Intake<T>>,
    ready: Notify,
}

impl<T> Shared<T> {
    fn push(&self, batch: impl IntoIterator<Item = T>) -> bool {
        {
            let mut intake = self.intake.lock().unwrap_or_else(|e| e.into_inner());
            if intake.closed {
                return false;
            }
            intake.pending.extend(batch);
        }
        self.ready.notify_one();
        true
    }

    fn close(&self) {
        self.intake.lock().unwrap_or_else(|e| e.into_inner()).closed = true;
        self.ready.notify_one();
    }

    fn take(&self) -> (Vec<T>, bool) {
        let mut intake = self.intake.lock().unwrap_or_else(|e| e.into_inner());
        (std::mem::take(&mut intake.pending), intake.closed)
    }
}

/// Producer handle for an [`EventQueue`]. Cheap to clone.
pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> QueueSender<T> {
    /// Append a batch in order. Never blocks.
    ///
    /// Returns `false` (dropping the batch) if the queue has been closed.
    pub fn push(&self, batch: impl IntoIterator<Item = T>) -> bool {
        self.shared.push(batch)
    }

    /// Close the queue. Items already pushed are still delivered.
    pub fn close(&self) {
        self.shared.close();
    }
}

/// Single-consumer queue with unbounded, non-blocking producers.
pub struct EventQueue<T> {
    shared: Arc<Shared<T>>,
    out: AsyncMutex<mpsc::Receiver<T>>,
}

impl<T: Send + 'static> EventQueue<T> {
    /// Create a queue and spawn its forwarding task on the current runtime.
    ///
    /// Cancelling `cancel` stops the forwarder; items not yet pulled are
    /// dropped and [`pull`](Self::pull) reports end of stream.
    pub fn new(cancel: CancellationToken) -> Self {
        let shared = Arc::new(Shared {
            intake: Mutex::new(Intake {
                pending: Vec::new(),
                closed: false,
            }),
            ready: Notify::new(),
        });
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(forward(Arc::clone(&shared), tx, cancel));
        Self {
            shared,
            out: AsyncMutex::new(rx),
        }
    }
}

impl<T> EventQueue<T> {
    #[must_use]
    pub fn sender(&self) -> QueueSender<T> {
        QueueSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [`QueueSender::push`].
    pub fn push(&self, batch: impl IntoIterator<Item = T>) -> bool {
        self.shared.push(batch)
    }

    pub fn close(&self) {
        self.shared.close();
    }

    /// Pull the next item, suspending until one is available.
    ///
    /// Returns `None` after the queue is closed and drained, or cancelled.
    pub async fn pull(&self) -> Option<T> {
        self.out.lock().await.recv().await
    }
}

impl<T> Drop for EventQueue<T> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

async fn forward<T>(shared: Arc<Shared<T>>, out: mpsc::Sender<T>, cancel: CancellationToken) {
    loop {
        let (batch, closed) = shared.take();
        if batch.is_empty() {
            if closed {
                break;
            }
            tokio::select! {
                () = cancel.cancelled() => break,
                () = shared.ready.notified() => continue,
            }
        }
        trace!(items = batch.len(), "forwarding queued batch");
        for item in batch {
            tokio::select! {
                () = cancel.cancelled() => return,
                sent = out.send(item) => {
                    if sent.is_err() {
                        // Consumer side is gone.
                        return;
                    }
                },
            }
        }
    }
}
