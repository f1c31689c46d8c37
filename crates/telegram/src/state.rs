use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use {
    chatrelay_channels::{AdapterFeed, ChannelAdapter, User},
    regex::Regex,
    teloxide::{Bot, types::ChatId},
    tokio_util::sync::CancellationToken,
};

use crate::{
    chat::{ChatUpdate, TelegramChat},
    config::TelegramAccountConfig,
    media::ProfilePhotos,
};

/// A joined chat: the adapter handed out by `join` and the feed the
/// polling loop pushes its updates into.
pub(crate) struct Route {
    pub feed: AdapterFeed<ChatUpdate>,
    pub channel: Arc<ChannelAdapter<TelegramChat>>,
}

/// Per-account runtime state shared by the client and its polling loop.
pub(crate) struct ClientState {
    pub account_id: String,
    pub bot: Bot,
    pub me: User,
    pub config: TelegramAccountConfig,
    pub no_web_preview: Option<Regex>,
    pub cancel: CancellationToken,
    pub photos: Arc<ProfilePhotos>,
    // Never held across `.await`.
    routes: Mutex<HashMap<ChatId, Route>>,
}

impl ClientState {
    pub fn new(
        account_id: String,
        bot: Bot,
        me: User,
        config: TelegramAccountConfig,
        no_web_preview: Option<Regex>,
    ) -> Self {
        Self {
            account_id,
            bot,
            me,
            config,
            no_web_preview,
            cancel: CancellationToken::new(),
            photos: Arc::new(ProfilePhotos::default()),
            routes: Mutex::new(HashMap::new()),
        }
    }

    pub fn routes(&self) -> MutexGuard<'_, HashMap<ChatId, Route>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn feed(&self, chat_id: ChatId) -> Option<AdapterFeed<ChatUpdate>> {
        self.routes().get(&chat_id).map(|r| r.feed.clone())
    }

    /// Apply `f` to every joined chat's feed.
    pub fn for_each_feed(&self, f: impl Fn(&AdapterFeed<ChatUpdate>)) {
        for route in self.routes().values() {
            f(&route.feed);
        }
    }
}
