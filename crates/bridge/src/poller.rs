use std::sync::Arc;

use {
    chatrelay_channels::{Channel, Event},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::error::Error;

/// An event tagged with the index of the bridged channel it came from.
pub(crate) struct Origin {
    pub index: usize,
    pub event: Event,
}

/// Pull events from one bridged channel into the relay intake until
/// cancelled or the channel fails.
///
/// Failures go to `errors`; only the first one reported by any poller is kept.
pub(crate) async fn poll(
    index: usize,
    channel: Arc<dyn Channel>,
    intake: mpsc::Sender<Origin>,
    errors: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => return,
            received = channel.receive() => received,
        };
        let failure = match received {
            Ok(Some(event)) => {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    sent = intake.send(Origin { index, event }) => {
                        if sent.is_err() {
                            return;
                        }
                    },
                }
                continue;
            },
            Err(e) if e.is_cancelled() => {
                debug!(channel = channel.name(), "poller cancelled");
                return;
            },
            Err(e) => Error::transport(channel.as_ref(), e),
            Ok(None) => Error::unexpected_eof(channel.as_ref()),
        };
        warn!(
            channel = channel.name(),
            service = channel.service_name(),
            error = %failure,
            "bridged channel failed"
        );
        // Never blocks: a full slot means another poller already reported.
        let _ = errors.try_send(failure);
        return;
    }
}
