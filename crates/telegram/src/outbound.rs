//! Outbound formatting and request helpers.

use std::{future::Future, time::Duration};

use {
    regex::Regex,
    teloxide::{
        ApiError, RequestError,
        types::{LinkPreviewOptions, MessageId as TgMessageId, ReplyParameters},
    },
    tracing::warn,
};

use chatrelay_channels::{Message, MessageId, User};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

const ME_PREFIX: &str = "/me ";

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// HTML body for a send, attributing it to `send_as` when given.
///
/// `/me` actions render as `<b>name</b> action`, everything else as
/// `<b>name:</b> text`.
pub fn format_outbound(send_as: Option<&User>, text: &str) -> String {
    let Some(user) = send_as else {
        return escape_html(text);
    };
    let name = escape_html(user.name());
    match text.strip_prefix(ME_PREFIX) {
        Some(action) => format!("<b>{name}</b> {}", escape_html(action)),
        None => format!("<b>{name}:</b> {}", escape_html(text)),
    }
}

/// Parse a chat-level message id into Telegram's numeric id.
pub fn parse_message_id(id: &MessageId) -> Option<TgMessageId> {
    id.as_str().parse::<i32>().ok().map(TgMessageId)
}

/// Reply parameters targeting `reply_to`, or `None` if its id is not a
/// Telegram message id.
pub fn reply_parameters(reply_to: &Message) -> Option<ReplyParameters> {
    parse_message_id(&reply_to.id).map(|id| ReplyParameters::new(id).allow_sending_without_reply())
}

/// Link preview options disabling the preview when `text` matches `filter`.
pub fn preview_options(filter: Option<&Regex>, text: &str) -> Option<LinkPreviewOptions> {
    filter
        .filter(|re| re.is_match(text))
        .map(|_| LinkPreviewOptions {
            is_disabled: true,
            url: None,
            prefer_small_media: false,
            prefer_large_media: false,
            show_above_text: false,
        })
}

pub fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

pub fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

/// Run a request, waiting out `RetryAfter` responses a bounded number of times.
pub async fn run_with_retry<T, F, Fut>(
    chat: &str,
    operation: &'static str,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        let err = match request().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        let Some(wait) = retry_after_duration(&err) else {
            return Err(err);
        };

        if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
            warn!(
                chat,
                operation,
                retries,
                retry_after_secs = wait.as_secs(),
                "telegram rate limit persisted after retries"
            );
            return Err(err);
        }

        retries += 1;
        warn!(
            chat,
            operation,
            retries,
            max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
            retry_after_secs = wait.as_secs(),
            "telegram rate limited, waiting before retry"
        );
        tokio::time::sleep(wait).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        rstest::rstest,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn ann() -> User {
        User {
            display_name: "Ann <3".into(),
            ..Default::default()
        }
    }

    #[rstest]
    #[case(None, "a < b && c", "a &lt; b &amp;&amp; c")]
    #[case(Some(ann()), "hi", "<b>Ann &lt;3:</b> hi")]
    #[case(Some(ann()), "/me waves", "<b>Ann &lt;3</b> waves")]
    #[case(Some(ann()), "/meh", "<b>Ann &lt;3:</b> /meh")]
    #[case(None, "/me waves", "/me waves")]
    fn formats_outbound(#[case] send_as: Option<User>, #[case] text: &str, #[case] expected: &str) {
        assert_eq!(format_outbound(send_as.as_ref(), text), expected);
    }

    #[test]
    fn reply_parameters_need_numeric_ids() {
        let mut msg = Message {
            id: "42".into(),
            ..Default::default()
        };
        let params = reply_parameters(&msg).unwrap();
        assert_eq!(params.message_id, TgMessageId(42));

        msg.id = "local-7".into();
        assert!(reply_parameters(&msg).is_none());
    }

    #[test]
    fn previews_disabled_only_on_match() {
        let re = Regex::new(r"example\.com").unwrap();
        assert!(preview_options(Some(&re), "see https://example.com").is_some_and(|p| p.is_disabled));
        assert!(preview_options(Some(&re), "nothing here").is_none());
        assert!(preview_options(None, "https://example.com").is_none());
    }

    #[test]
    fn retry_after_duration_extracts_wait() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(42));
        assert_eq!(retry_after_duration(&err), Some(Duration::from_secs(42)));
    }

    #[test]
    fn retry_after_duration_ignores_other_errors() {
        let err = RequestError::Io(std::io::Error::other("boom"));
        assert_eq!(retry_after_duration(&err), None);
    }

    #[test]
    fn detects_message_not_modified() {
        assert!(is_message_not_modified_error(&RequestError::Api(
            ApiError::MessageNotModified
        )));
        assert!(!is_message_not_modified_error(&RequestError::Io(
            std::io::Error::other("boom")
        )));
    }

    #[tokio::test]
    async fn retries_rate_limits_then_gives_up() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = run_with_retry("chat", "send message", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(0))) }
        })
        .await;
        assert!(matches!(result, Err(RequestError::RetryAfter(_))));
        assert_eq!(calls.load(Ordering::SeqCst), TELEGRAM_RETRY_AFTER_MAX_RETRIES + 1);
    }

    #[tokio::test]
    async fn retry_succeeds_after_wait() {
        let calls = AtomicUsize::new(0);
        let result = run_with_retry("chat", "send message", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(0)))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = run_with_retry("chat", "edit message", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RequestError::Io(std::io::Error::other("boom"))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
