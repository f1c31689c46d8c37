use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{counter, labels, telegram as tg_metrics};

use chatrelay_channels as channels;

use crate::{
    chat::ChatUpdate,
    config::TelegramAccountConfig,
    error::{Error, Result},
    media,
    state::ClientState,
};

/// Long-polling timeout passed to getUpdates.
const POLL_TIMEOUT_SECS: u32 = 30;

/// Delay before retrying a failed getUpdates call.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Build a bot whose HTTP client outlives the long-polling timeout, so the
/// client does not abort the request before Telegram responds.
pub fn build_bot(config: &TelegramAccountConfig) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(POLL_TIMEOUT_SECS) + 15))
        .build()?;
    Ok(Bot::with_client(config.token.expose_secret(), client))
}

/// Fetch updates until cancelled, routing each to the chat it belongs to.
///
/// A conflicting poller (another process using the same token) is fatal:
/// every joined chat's feed fails and the loop ends with [`Error::Conflict`].
/// Other failures are logged and retried. On exit all feeds are closed.
pub(crate) async fn poll_updates(state: Arc<ClientState>) -> Result<()> {
    info!(account_id = %state.account_id, "starting telegram polling loop");
    let mut offset: i32 = 0;

    let result = loop {
        let fetched = tokio::select! {
            () = state.cancel.cancelled() => break Ok(()),
            fetched = state
                .bot
                .get_updates()
                .offset(offset)
                .timeout(POLL_TIMEOUT_SECS)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::EditedMessage])
                .send() => fetched,
        };

        match fetched {
            Ok(updates) => {
                debug!(
                    account_id = %state.account_id,
                    count = updates.len(),
                    "got telegram updates"
                );
                for update in updates {
                    offset = update.id.as_offset();
                    dispatch(&state, update.kind);
                }
            },
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                warn!(
                    account_id = %state.account_id,
                    "telegram bot disabled: another instance is already running with this token"
                );
                state.for_each_feed(|feed| {
                    feed.fail(channels::Error::unavailable(Error::Conflict));
                });
                break Err(Error::Conflict);
            },
            Err(e) => {
                warn!(account_id = %state.account_id, error = %e, "telegram getUpdates failed");
                #[cfg(feature = "metrics")]
                counter!(
                    tg_metrics::POLLING_ERRORS_TOTAL,
                    labels::ACCOUNT_ID => state.account_id.clone()
                )
                .increment(1);
                tokio::select! {
                    () = state.cancel.cancelled() => break Ok(()),
                    () = tokio::time::sleep(POLL_RETRY_DELAY) => {},
                }
            },
        }
    };

    state.for_each_feed(|feed| feed.close());
    info!(account_id = %state.account_id, "telegram polling stopped");
    result
}

/// Route one update to its chat's feed. Only group chats are relayed.
fn dispatch(state: &ClientState, kind: UpdateKind) {
    let update = match kind {
        UpdateKind::Message(msg) => ChatUpdate::Message(msg),
        UpdateKind::EditedMessage(msg) => ChatUpdate::Edited(msg),
        other => {
            debug!(account_id = %state.account_id, "ignoring non-message update: {other:?}");
            return;
        },
    };
    let chat = match &update {
        ChatUpdate::Message(m) | ChatUpdate::Edited(m) => &m.chat,
    };
    if chat.title().is_none() {
        debug!(chat_id = chat.id.0, "ignoring update outside a group");
        return;
    }

    let chat_id = chat.id;
    debug!(chat_id = chat_id.0, kind = update.kind(), "received telegram update");
    #[cfg(feature = "metrics")]
    counter!(tg_metrics::UPDATES_RECEIVED_TOTAL, labels::KIND => update.kind()).increment(1);

    match state.feed(chat_id) {
        Some(feed) => {
            refresh_sender_photo(state, &update);
            if !feed.deliver([update]) {
                debug!(chat_id = chat_id.0, "feed closed, dropping update");
            }
        },
        None => {
            debug!(chat_id = chat_id.0, "ignoring update for a chat that was not joined");
            #[cfg(feature = "metrics")]
            counter!(tg_metrics::UNROUTED_UPDATES_TOTAL).increment(1);
        },
    }
}

/// Start a profile photo lookup for the sender when one is due. Only done
/// when there is a media URL to link the photo under.
fn refresh_sender_photo(state: &ClientState, update: &ChatUpdate) {
    if state.config.media_base_url.is_none() {
        return;
    }
    let Some(from) = update.message().from.as_ref() else {
        return;
    };
    if state.photos.claim_refresh(from.id) {
        tokio::spawn(media::refresh_photo(
            state.bot.clone(),
            Arc::clone(&state.photos),
            from.id,
        ));
    }
}
