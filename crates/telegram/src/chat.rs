//! One joined Telegram chat as a [`Backend`].

use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    regex::Regex,
    teloxide::{
        prelude::*,
        types::{Message as TgMessage, ParseMode, User as TgUser},
    },
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{counter, histogram, telegram as tg_metrics};

use chatrelay_channels::{self as channels, Backend, Event, Message, MessageId, User};

use crate::{
    error::Error,
    media::{ProfilePhotos, media_url},
    outbound,
};

pub const SERVICE_NAME: &str = "Telegram";

/// A native update routed to one chat.
#[derive(Debug, Clone)]
pub enum ChatUpdate {
    Message(TgMessage),
    Edited(TgMessage),
}

impl ChatUpdate {
    pub(crate) fn message(&self) -> &TgMessage {
        match self {
            Self::Message(m) | Self::Edited(m) => m,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Edited(_) => "edited_message",
        }
    }
}

pub struct TelegramChat {
    bot: Bot,
    chat_id: ChatId,
    title: String,
    /// The bot's own user, reported as the sender of plain sends.
    me: User,
    media_base_url: Option<String>,
    photos: Option<Arc<ProfilePhotos>>,
    no_web_preview: Option<Regex>,
}

impl TelegramChat {
    pub fn new(bot: Bot, chat_id: ChatId, title: impl Into<String>, me: User) -> Self {
        let title = title.into();
        Self {
            bot,
            title: if title.is_empty() {
                chat_id.0.to_string()
            } else {
                title
            },
            chat_id,
            me,
            media_base_url: None,
            photos: None,
            no_web_preview: None,
        }
    }

    #[must_use]
    pub fn with_media_base_url(mut self, url: Option<String>) -> Self {
        self.media_base_url = url.filter(|u| !u.is_empty());
        self
    }

    /// Fill `photo_url` from cached profile photos, served under the media
    /// base URL.
    #[must_use]
    pub fn with_profile_photos(mut self, photos: Arc<ProfilePhotos>) -> Self {
        self.photos = Some(photos);
        self
    }

    #[must_use]
    pub fn with_preview_filter(mut self, filter: Option<Regex>) -> Self {
        self.no_web_preview = filter;
        self
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    fn map_message(&self, msg: &TgMessage) -> Option<Event> {
        let Some(from) = msg.from.as_ref() else {
            debug!(chat = %self.title, id = msg.id.0, "ignoring message without sender");
            return None;
        };

        // A reply whose target has no sender is relayed as a plain message.
        if let Some(target) = msg.reply_to_message()
            && let Some(target_from) = target.from.as_ref()
        {
            return Some(Event::Reply {
                reply_to: self.chat_message(target, target_from),
                reply: self.chat_message(msg, from),
            });
        }
        if let Some(member) = msg.new_chat_members().and_then(|members| members.first()) {
            return Some(Event::Join {
                who: self.user(member),
            });
        }
        if let Some(member) = msg.left_chat_member() {
            return Some(Event::Leave {
                who: self.user(member),
            });
        }
        if let Some(doc) = msg.document() {
            return self.media_message(msg, from, "shared a file", &doc.file.id.to_string());
        }
        if let Some(sticker) = msg.sticker() {
            return self.media_message(msg, from, "sent a sticker", &sticker.file.id.to_string());
        }
        msg.text()
            .map(|_| Event::Message(self.chat_message(msg, from)))
    }

    fn chat_message(&self, msg: &TgMessage, from: &TgUser) -> Message {
        Message {
            id: message_id(msg),
            from: self.user(from),
            text: msg.text().unwrap_or_default().to_string(),
        }
    }

    fn user(&self, user: &TgUser) -> User {
        let photo_url = self
            .media_base_url
            .as_deref()
            .zip(self.photos.as_ref())
            .and_then(|(base, photos)| Some(media_url(base, &photos.file_id(user.id)?)));
        User {
            photo_url,
            ..chat_user(user)
        }
    }

    fn media_message(
        &self,
        msg: &TgMessage,
        from: &TgUser,
        action: &str,
        file_id: &str,
    ) -> Option<Event> {
        let url = media_url(self.media_base_url.as_deref()?, file_id);
        Some(Event::Message(Message {
            id: message_id(msg),
            from: self.user(from),
            text: format!("/me {action}: {url}"),
        }))
    }
}

#[async_trait]
impl Backend for TelegramChat {
    type Update = ChatUpdate;

    fn name(&self) -> &str {
        &self.title
    }

    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    fn update_time(&self, update: &ChatUpdate) -> Option<DateTime<Utc>> {
        Some(update.message().date)
    }

    fn map_update(&self, update: ChatUpdate) -> channels::Result<Option<Event>> {
        Ok(match update {
            ChatUpdate::Message(msg) => self.map_message(&msg),
            ChatUpdate::Edited(msg) => {
                let id = message_id(&msg);
                Some(Event::Edit {
                    new_id: id.clone(),
                    id,
                    text: msg.text().unwrap_or_default().to_string(),
                })
            },
        })
    }

    async fn send(
        &self,
        send_as: Option<&User>,
        reply_to: Option<&Message>,
        text: &str,
    ) -> channels::Result<Message> {
        let html = outbound::format_outbound(send_as, text);
        let reply = reply_to.and_then(outbound::reply_parameters);
        let preview = outbound::preview_options(self.no_web_preview.as_ref(), text);

        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        let sent = outbound::run_with_retry(&self.title, "send message", || {
            let mut req = self
                .bot
                .send_message(self.chat_id, html.as_str())
                .parse_mode(ParseMode::Html);
            if let Some(rp) = &reply {
                req = req.reply_parameters(rp.clone());
            }
            if let Some(p) = &preview {
                req = req.link_preview_options(p.clone());
            }
            async move { req.await }
        })
        .await
        .map_err(|e| {
            warn!(chat = %self.title, chat_id = self.chat_id.0, error = %e, "telegram send failed");
            #[cfg(feature = "metrics")]
            counter!(tg_metrics::MESSAGE_SEND_ERRORS_TOTAL).increment(1);
            Error::from(e)
        })?;

        #[cfg(feature = "metrics")]
        {
            counter!(tg_metrics::MESSAGES_SENT_TOTAL).increment(1);
            histogram!(tg_metrics::MESSAGE_SEND_DURATION_SECONDS)
                .record(start.elapsed().as_secs_f64());
        }

        let from = match send_as {
            Some(user) => user.clone(),
            None => sent.from.as_ref().map_or_else(|| self.me.clone(), chat_user),
        };
        Ok(Message {
            id: message_id(&sent),
            from,
            text: text.to_string(),
        })
    }

    async fn edit(&self, id: &MessageId, text: &str) -> channels::Result<MessageId> {
        let Some(message_id) = outbound::parse_message_id(id) else {
            return Err(channels::Error::invalid_input(format!(
                "not a telegram message id: {id}"
            )));
        };
        let html = outbound::escape_html(text);
        let edited = outbound::run_with_retry(&self.title, "edit message", || {
            let req = self
                .bot
                .edit_message_text(self.chat_id, message_id, html.as_str())
                .parse_mode(ParseMode::Html);
            async move { req.await }
        })
        .await;
        match edited {
            Ok(msg) => Ok(self::message_id(&msg)),
            Err(e) if outbound::is_message_not_modified_error(&e) => Ok(id.clone()),
            Err(e) => {
                warn!(chat = %self.title, %id, error = %e, "telegram edit failed");
                Err(Error::from(e).into())
            },
        }
    }

    // Bot API deletion is not used; relayed deletes are a no-op here.
}

fn message_id(msg: &TgMessage) -> MessageId {
    MessageId::new(msg.id.0.to_string())
}

/// Map a Telegram user; the nick falls back to the full name.
pub(crate) fn chat_user(user: &TgUser) -> User {
    let name = format!(
        "{} {}",
        user.first_name,
        user.last_name.as_deref().unwrap_or_default()
    )
    .trim()
    .to_string();
    User {
        id: user.id.0.to_string().into(),
        nick: user.username.clone().unwrap_or_else(|| name.clone()),
        full_name: name.clone(),
        display_name: name,
        photo_url: None,
    }
}
