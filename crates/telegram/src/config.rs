use {
    regex::Regex,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

/// Configuration for a single Telegram bot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramAccountConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Chat ids to join, as decimal strings (group ids are negative).
    pub chats: Vec<String>,

    /// Public base URL under which media file ids are served. Documents and
    /// stickers are only relayed when this is set.
    pub media_base_url: Option<String>,

    /// Sends whose text matches this regex go out without a link preview.
    pub no_web_preview: Option<String>,
}

impl TelegramAccountConfig {
    /// Deserialize an account entry from the config file.
    pub fn from_value(account_id: &str, value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value).map_err(|source| Error::Config {
            account_id: account_id.to_string(),
            source,
        })?;
        if config.token.expose_secret().is_empty() {
            return Err(Error::message(format!(
                "telegram account {account_id} has no token"
            )));
        }
        Ok(config)
    }

    /// Compile `no_web_preview`, if set.
    pub fn preview_filter(&self) -> Result<Option<Regex>> {
        Ok(self
            .no_web_preview
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(Regex::new)
            .transpose()?)
    }
}

impl std::fmt::Debug for TelegramAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAccountConfig")
            .field("token", &"[REDACTED]")
            .field("chats", &self.chats)
            .field("media_base_url", &self.media_base_url)
            .field("no_web_preview", &self.no_web_preview)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramAccountConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            chats: Vec::new(),
            media_base_url: None,
            no_web_preview: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn deserialize_from_json() {
        let cfg = TelegramAccountConfig::from_value(
            "main",
            json!({
                "token": "123:ABC",
                "chats": ["-1001", "-1002"],
                "no_web_preview": "youtube\\.com"
            }),
        )
        .unwrap();
        assert_eq!(cfg.token.expose_secret(), "123:ABC");
        assert_eq!(cfg.chats, vec!["-1001", "-1002"]);
        assert!(cfg.media_base_url.is_none());
        let filter = cfg.preview_filter().unwrap().unwrap();
        assert!(filter.is_match("https://youtube.com/watch"));
    }

    #[test]
    fn token_is_required() {
        let err = TelegramAccountConfig::from_value("main", json!({ "chats": ["1"] })).unwrap_err();
        assert!(err.to_string().contains("no token"));
    }

    #[test]
    fn wrong_types_name_the_account() {
        let err = TelegramAccountConfig::from_value("alt", json!({ "token": "t", "chats": 5 }))
            .unwrap_err();
        assert!(matches!(err, Error::Config { ref account_id, .. } if account_id == "alt"));
    }

    #[test]
    fn bad_preview_regex_is_an_error() {
        let cfg = TelegramAccountConfig {
            no_web_preview: Some("(".into()),
            ..Default::default()
        };
        assert!(matches!(cfg.preview_filter(), Err(Error::Regex(_))));
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TelegramAccountConfig {
            token: Secret::new("super-secret".into()),
            ..Default::default()
        };
        let out = format!("{cfg:?}");
        assert!(!out.contains("super-secret"));
        assert!(out.contains("[REDACTED]"));
    }
}
