//! Fan-out of one event to every other bridged channel.

use {
    chatrelay_channels::{Channel, Event, Message, MessageId, User},
    futures::future::join_all,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{bridge as bridge_metrics, counter, labels};

use crate::{
    bridge::Shared,
    correlation::{Endpoint, LogEntry, MessageCopy},
    error::{Error, Result, describe},
};

/// A channel receiving a relayed operation.
#[derive(Clone, Copy)]
pub(crate) struct Target<'a> {
    pub endpoint: Endpoint,
    pub channel: &'a dyn Channel,
}

/// Relay one event that arrived on bridged channel `origin`.
pub(crate) async fn relay(shared: &Shared, origin: usize, event: &Event) -> Result<()> {
    let origin_ep = Endpoint::Bridged(origin);
    let source = shared.channel(origin);
    let targets = shared.targets_except(origin_ep);

    match event {
        Event::Message(msg) => {
            let mut copies = broadcast(&targets, Some(&msg.from), None, &msg.text).await?;
            copies.push(MessageCopy {
                to: origin_ep,
                message: msg.clone(),
            });
            shared.record(LogEntry::new(origin_ep, copies));
        },
        Event::Reply { reply_to, reply } => {
            let entry = shared.find(origin_ep, &reply_to.id);
            if entry.is_none() {
                debug!(id = %reply_to.id, "reply target not in history, relaying as a plain message");
            }
            let mut copies = broadcast(&targets, None, entry.as_deref(), &reply.text).await?;
            copies.push(MessageCopy {
                to: origin_ep,
                message: reply.clone(),
            });
            shared.record(LogEntry::new(origin_ep, copies));
        },
        Event::Edit { id, new_id, text } => {
            let Some(entry) = shared.find(origin_ep, id) else {
                debug!(%id, "edited message not in history");
                correlation_miss("edit");
                return Ok(());
            };
            let mut ids = edit_copies(&targets, &entry, text).await?;
            ids.push((origin_ep, new_id.clone()));
            let successor = entry.with_ids(&ids);
            if successor != *entry {
                shared.record(successor);
            }
        },
        Event::Delete { id } => {
            let Some(entry) = shared.find(origin_ep, id) else {
                debug!(%id, "deleted message not in history");
                correlation_miss("delete");
                return Ok(());
            };
            delete_copies(&targets, &entry).await?;
        },
        Event::Join { who } => {
            let text = format!("{} joined {}", who.name(), describe(source));
            broadcast(&targets, None, None, &text).await?;
        },
        Event::Leave { who } => {
            let text = format!("{} left {}", who.name(), describe(source));
            broadcast(&targets, None, None, &text).await?;
        },
        Event::Rename { from, to } => {
            if from.name() != to.name() {
                let text = format!(
                    "{} renamed to {} in {}",
                    from.name(),
                    to.name(),
                    describe(source)
                );
                broadcast(&targets, None, None, &text).await?;
            }
        },
    }
    Ok(())
}

/// Send `text` to every target concurrently and wait for all of them.
///
/// Targets holding a copy of `reply_to`'s message get a reply to that copy;
/// the others get a plain send. The first failure, in target order, is
/// returned once every send has finished.
pub(crate) async fn broadcast(
    targets: &[Target<'_>],
    send_as: Option<&User>,
    reply_to: Option<&LogEntry>,
    text: &str,
) -> Result<Vec<MessageCopy>> {
    let sends = targets.iter().map(|target| async move {
        let local = reply_to.and_then(|entry| entry.copy_on(target.endpoint));
        let ch = target.channel;
        let sent = match (local, send_as) {
            (Some(replied), Some(user)) => ch.reply_as(user, replied, text).await,
            (Some(replied), None) => ch.reply(replied, text).await,
            (None, Some(user)) => ch.send_as(user, text).await,
            (None, None) => ch.send(text).await,
        };
        match sent {
            Ok(message) => Ok(MessageCopy {
                to: target.endpoint,
                message,
            }),
            Err(e) => {
                warn!(
                    channel = ch.name(),
                    service = ch.service_name(),
                    error = %e,
                    "failed to send message"
                );
                broadcast_failed("send");
                Err(Error::broadcast(ch, e))
            },
        }
    });
    join_all(sends).await.into_iter().collect()
}

/// Edit every target's copy of `entry`, returning the ids after editing.
async fn edit_copies(
    targets: &[Target<'_>],
    entry: &LogEntry,
    text: &str,
) -> Result<Vec<(Endpoint, MessageId)>> {
    let edits = targets.iter().filter_map(|target| {
        let copy = entry.copy_on(target.endpoint)?;
        Some(async move {
            let ch = target.channel;
            match ch.edit(&copy.id, text).await {
                Ok(new_id) => Ok((target.endpoint, new_id)),
                Err(e) => {
                    warn!(
                        channel = ch.name(),
                        service = ch.service_name(),
                        id = %copy.id,
                        error = %e,
                        "failed to send edit"
                    );
                    broadcast_failed("edit");
                    Err(Error::broadcast(ch, e))
                },
            }
        })
    });
    join_all(edits).await.into_iter().collect()
}

async fn delete_copies(targets: &[Target<'_>], entry: &LogEntry) -> Result<()> {
    let deletes = targets.iter().filter_map(|target| {
        let copy: &Message = entry.copy_on(target.endpoint)?;
        Some(async move {
            let ch = target.channel;
            ch.delete(&copy.id).await.map_err(|e| {
                warn!(
                    channel = ch.name(),
                    service = ch.service_name(),
                    id = %copy.id,
                    error = %e,
                    "failed to send delete"
                );
                broadcast_failed("delete");
                Error::broadcast(ch, e)
            })
        })
    });
    join_all(deletes).await.into_iter().collect()
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn broadcast_failed(operation: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(bridge_metrics::BROADCAST_ERRORS_TOTAL, labels::OPERATION => operation).increment(1);
}

#[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
fn correlation_miss(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(bridge_metrics::CORRELATION_MISSES_TOTAL, labels::KIND => kind).increment(1);
}
