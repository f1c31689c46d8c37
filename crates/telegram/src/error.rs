use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Channel(#[from] chatrelay_channels::Error),

    #[error("invalid config for telegram account {account_id}: {source}")]
    Config {
        account_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid no_web_preview pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid telegram chat id {value:?}")]
    InvalidChatId { value: String },

    /// Another process is polling updates with the same bot token.
    #[error("another bot instance is already running with this token")]
    Conflict,

    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl From<Error> for chatrelay_channels::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Channel(inner) => inner,
            Error::InvalidChatId { .. } => Self::invalid_input(err),
            Error::Conflict => Self::unavailable(err),
            other => Self::external("telegram", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
