//! Abstract chat events shared by every backend.

use serde::{Deserialize, Serialize};

/// Opaque message identifier. Unique only within the channel that issued it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque user identifier, scoped to the backend that reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A user of a chat service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nick: String,
    pub full_name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl User {
    /// A name suitable for display, falling back through the less friendly fields.
    #[must_use]
    pub fn name(&self) -> &str {
        [
            self.display_name.as_str(),
            self.full_name.as_str(),
            self.nick.as_str(),
            self.id.0.as_str(),
        ]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("unknown")
    }
}

/// A message sent by a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from: User,
    pub text: String,
}

/// One observed occurrence on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Message(Message),
    Reply {
        reply_to: Message,
        reply: Message,
    },
    /// A message was edited. `new_id` is the identifier after editing, which
    /// may equal `id` on services that keep ids stable.
    Edit {
        id: MessageId,
        new_id: MessageId,
        text: String,
    },
    Delete {
        id: MessageId,
    },
    Join {
        who: User,
    },
    Leave {
        who: User,
    },
    /// A user changed their nick or name. `from` and `to` share the same id.
    Rename {
        from: User,
        to: User,
    },
}

impl Event {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Reply { .. } => "reply",
            Self::Edit { .. } => "edit",
            Self::Delete { .. } => "delete",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Rename { .. } => "rename",
        }
    }
}

impl From<Message> for Event {
    fn from(msg: Message) -> Self {
        Self::Message(msg)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn user(id: &str, nick: &str, full: &str, display: &str) -> User {
        User {
            id: id.into(),
            nick: nick.into(),
            full_name: full.into(),
            display_name: display.into(),
            photo_url: None,
        }
    }

    #[rstest]
    #[case(user("1", "ally", "Alice Liddell", "Alice"), "Alice")]
    #[case(user("1", "ally", "Alice Liddell", ""), "Alice Liddell")]
    #[case(user("1", "ally", "", ""), "ally")]
    #[case(user("1", "", "", ""), "1")]
    #[case(user("", "", "", ""), "unknown")]
    fn name_falls_back(#[case] u: User, #[case] expected: &str) {
        assert_eq!(u.name(), expected);
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let ev = Event::Delete { id: "42".into() };
        let json = serde_json::to_value(&ev).unwrap_or_default();
        assert_eq!(json["kind"], "delete");
        assert_eq!(json["id"], "42");
    }

    #[test]
    fn kind_labels() {
        assert_eq!(Event::Message(Message::default()).kind(), "message");
        assert_eq!(
            Event::Rename {
                from: User::default(),
                to: User::default()
            }
            .kind(),
            "rename"
        );
    }
}
