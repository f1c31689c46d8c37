use thiserror::Error;

use chatrelay_channels::Channel;

#[derive(Debug, Error)]
pub enum Error {
    /// A bridged channel failed while being polled.
    #[error("receiving from {channel} failed: {source}")]
    Transport {
        channel: String,
        #[source]
        source: chatrelay_channels::Error,
    },

    /// A bridged channel ran out of events.
    #[error("unexpected end of stream from {channel}")]
    UnexpectedEof { channel: String },

    /// Sending, editing, or deleting on one relay target failed.
    #[error("relaying to {channel} failed: {source}")]
    Broadcast {
        channel: String,
        #[source]
        source: chatrelay_channels::Error,
    },

    /// The bridge was already closed.
    #[error("bridge already closed")]
    Closed,

    #[error(transparent)]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn transport(channel: &dyn Channel, source: chatrelay_channels::Error) -> Self {
        Self::Transport {
            channel: describe(channel),
            source,
        }
    }

    pub(crate) fn unexpected_eof(channel: &dyn Channel) -> Self {
        Self::UnexpectedEof {
            channel: describe(channel),
        }
    }

    pub(crate) fn broadcast(channel: &dyn Channel, source: chatrelay_channels::Error) -> Self {
        Self::Broadcast {
            channel: describe(channel),
            source,
        }
    }
}

impl From<Error> for chatrelay_channels::Error {
    fn from(err: Error) -> Self {
        Self::external("bridge", err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// "<name> on <service>", the way channels are referred to in messages and logs.
pub(crate) fn describe(channel: &dyn Channel) -> String {
    format!("{} on {}", channel.name(), channel.service_name())
}
