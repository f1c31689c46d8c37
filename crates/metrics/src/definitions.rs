//! Metric name and label definitions.
//!
//! Every metric chatrelay records is named here so the exported set is
//! documented in one place.

/// Relay engine metrics
pub mod bridge {
    /// Events relayed, labelled by event kind
    pub const EVENTS_RELAYED_TOTAL: &str = "chatrelay_bridge_events_relayed_total";
    /// Time spent relaying one event, in seconds
    pub const RELAY_DURATION_SECONDS: &str = "chatrelay_bridge_relay_duration_seconds";
    /// Failed sends, edits, and deletes on relay targets
    pub const BROADCAST_ERRORS_TOTAL: &str = "chatrelay_bridge_broadcast_errors_total";
    /// Edits and deletes whose message was not in the correlation log
    pub const CORRELATION_MISSES_TOTAL: &str = "chatrelay_bridge_correlation_misses_total";
    /// Entries currently held in the correlation log
    pub const LOG_ENTRIES: &str = "chatrelay_bridge_log_entries";
}

/// Telegram channel metrics
pub mod telegram {
    /// Updates received from getUpdates, labelled by kind
    pub const UPDATES_RECEIVED_TOTAL: &str = "chatrelay_telegram_updates_received_total";
    /// Messages sent to Telegram
    pub const MESSAGES_SENT_TOTAL: &str = "chatrelay_telegram_messages_sent_total";
    /// Message send duration in seconds
    pub const MESSAGE_SEND_DURATION_SECONDS: &str =
        "chatrelay_telegram_message_send_duration_seconds";
    /// Message send errors
    pub const MESSAGE_SEND_ERRORS_TOTAL: &str = "chatrelay_telegram_message_send_errors_total";
    /// Failed getUpdates calls
    pub const POLLING_ERRORS_TOTAL: &str = "chatrelay_telegram_polling_errors_total";
    /// Updates for chats nobody joined
    pub const UNROUTED_UPDATES_TOTAL: &str = "chatrelay_telegram_unrouted_updates_total";
    /// Chats currently joined
    pub const ACTIVE_CHATS: &str = "chatrelay_telegram_active_chats";
}

/// Common label keys used across metrics
pub mod labels {
    pub const KIND: &str = "kind";
    pub const OPERATION: &str = "operation";
    pub const ACCOUNT_ID: &str = "account_id";
}

/// Histogram buckets
pub mod buckets {
    /// Relay and send durations, 1ms to 60s
    pub const DURATION: &[f64] = &[
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
    ];
}
