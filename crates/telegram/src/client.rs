use std::sync::Arc;

use {
    async_trait::async_trait,
    chrono::{SubsecRound, Utc},
    teloxide::{prelude::*, types::ChatId},
    tokio::{sync::Mutex as AsyncMutex, task::JoinHandle},
    tracing::info,
};

#[cfg(feature = "metrics")]
use chatrelay_metrics::{gauge, telegram as tg_metrics};

use chatrelay_channels::{self as channels, Channel, ChannelAdapter, Client};

use crate::{
    bot,
    chat::{TelegramChat, chat_user},
    config::TelegramAccountConfig,
    error::{Error, Result},
    media::MediaProxy,
    state::{ClientState, Route},
};

/// A connection to the Telegram Bot API for one bot account.
///
/// One polling loop per client fetches updates and routes them to the chats
/// joined through [`Client::join`].
pub struct TelegramClient {
    state: Arc<ClientState>,
    poll_task: AsyncMutex<Option<JoinHandle<Result<()>>>>,
}

impl TelegramClient {
    /// Connect with the account's token and start polling.
    pub async fn connect(account_id: &str, config: TelegramAccountConfig) -> Result<Self> {
        let bot = bot::build_bot(&config)?;
        Self::with_bot(account_id, config, bot).await
    }

    /// Connect using an already configured bot, e.g. one pointed at another API URL.
    pub async fn with_bot(
        account_id: &str,
        config: TelegramAccountConfig,
        bot: Bot,
    ) -> Result<Self> {
        let no_web_preview = config.preview_filter()?;

        // Verify credentials and learn the bot's own identity.
        let me = bot.get_me().await?;
        // Long polling does not work while a webhook is set.
        bot.delete_webhook().send().await?;

        info!(
            account_id,
            username = ?me.username,
            "telegram bot connected (webhook cleared)"
        );

        let state = Arc::new(ClientState::new(
            account_id.to_string(),
            bot,
            chat_user(&me.user),
            config,
            no_web_preview,
        ));
        let poll_task = tokio::spawn(bot::poll_updates(Arc::clone(&state)));
        Ok(Self {
            state,
            poll_task: AsyncMutex::new(Some(poll_task)),
        })
    }

    pub fn account_id(&self) -> &str {
        &self.state.account_id
    }

    /// HTTP routes serving this account's files under its `media_base_url`.
    pub fn media_proxy(&self) -> MediaProxy {
        MediaProxy::new(self.state.bot.clone())
    }

    /// Chat ids this account is configured to join.
    pub fn configured_chats(&self) -> &[String] {
        &self.state.config.chats
    }

    async fn join_chat(&self, id: &str) -> Result<Arc<ChannelAdapter<TelegramChat>>> {
        let chat_id = id
            .trim()
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| Error::InvalidChatId {
                value: id.to_string(),
            })?;
        if let Some(route) = self.state.routes().get(&chat_id) {
            return Ok(Arc::clone(&route.channel));
        }

        let chat = self.state.bot.get_chat(chat_id).await?;
        let backend = TelegramChat::new(
            self.state.bot.clone(),
            chat_id,
            chat.title().unwrap_or_default(),
            self.state.me.clone(),
        )
        .with_media_base_url(self.state.config.media_base_url.clone())
        .with_profile_photos(Arc::clone(&self.state.photos))
        .with_preview_filter(self.state.no_web_preview.clone());

        // Telegram dates have whole-second precision.
        let created = Utc::now().trunc_subsecs(0);
        let adapter = Arc::new(ChannelAdapter::with_created(
            backend,
            self.state.cancel.child_token(),
            created,
        ));

        let mut routes = self.state.routes();
        let route = routes.entry(chat_id).or_insert_with(|| Route {
            feed: adapter.feed(),
            channel: Arc::clone(&adapter),
        });
        info!(
            account_id = %self.state.account_id,
            chat_id = chat_id.0,
            title = route.channel.name(),
            "joined telegram chat"
        );
        let channel = Arc::clone(&route.channel);
        #[cfg(feature = "metrics")]
        gauge!(tg_metrics::ACTIVE_CHATS).set(routes.len() as f64);
        Ok(channel)
    }
}

#[async_trait]
impl Client for TelegramClient {
    /// Join a group by its decimal chat id. Joining twice returns the same channel.
    async fn join(&self, channel: &str) -> channels::Result<Arc<dyn Channel>> {
        let joined: Arc<dyn Channel> = self.join_chat(channel).await?;
        Ok(joined)
    }

    /// Stop polling and end every joined chat's feed.
    ///
    /// Reports the error that stopped polling early, if any. A second close
    /// returns [`channels::Error::Closed`].
    async fn close(&self) -> channels::Result<()> {
        self.state.cancel.cancel();
        let Some(task) = self.poll_task.lock().await.take() else {
            return Err(channels::Error::Closed);
        };
        task.await.map_err(Error::from)??;
        info!(account_id = %self.state.account_id, "telegram client closed");
        Ok(())
    }
}

impl Drop for TelegramClient {
    fn drop(&mut self) {
        self.state.cancel.cancel();
    }
}
