//! Correlation log: which copy of a message lives on which channel.
//!
//! Message ids are only unique per channel, so a reply, edit, or delete
//! arriving on one channel is mapped to the other channels through the
//! entry recorded when the original message was relayed.

use std::{collections::VecDeque, sync::Arc};

use chatrelay_channels::{Message, MessageId};

/// Default number of entries kept by a bridge.
pub const DEFAULT_HISTORY: usize = 500;

/// A channel taking part in a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The bridge itself, for messages sent directly through it.
    Local,
    /// A bridged channel, by position in the bridge's channel list.
    Bridged(usize),
}

/// One copy of a relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCopy {
    pub to: Endpoint,
    pub message: Message,
}

/// The result of one relay operation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    origin: Endpoint,
    copies: Vec<MessageCopy>,
}

impl LogEntry {
    #[must_use]
    pub fn new(origin: Endpoint, copies: Vec<MessageCopy>) -> Self {
        Self { origin, copies }
    }

    #[must_use]
    pub fn origin(&self) -> Endpoint {
        self.origin
    }

    #[must_use]
    pub fn copies(&self) -> &[MessageCopy] {
        &self.copies
    }

    /// The copy of this entry's message that lives on `to`, if any.
    #[must_use]
    pub fn copy_on(&self, to: Endpoint) -> Option<&Message> {
        self.copies
            .iter()
            .find(|c| c.to == to)
            .map(|c| &c.message)
    }

    /// A successor entry with the given copies re-identified, e.g. after an edit.
    #[must_use]
    pub fn with_ids(&self, ids: &[(Endpoint, MessageId)]) -> Self {
        let copies = self
            .copies
            .iter()
            .map(|c| {
                let mut copy = c.clone();
                if let Some((_, id)) = ids.iter().find(|(to, _)| *to == c.to) {
                    copy.message.id = id.clone();
                }
                copy
            })
            .collect();
        Self {
            origin: self.origin,
            copies,
        }
    }
}

/// Bounded history of relay operations, oldest first.
///
/// When full, appending evicts the oldest entry.
#[derive(Debug)]
pub struct CorrelationLog {
    entries: VecDeque<Arc<LogEntry>>,
    capacity: usize,
}

impl Default for CorrelationLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

impl CorrelationLog {
    /// A log holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY)),
            capacity,
        }
    }

    /// Append an entry, returning how many old entries were evicted.
    pub fn append(&mut self, entry: LogEntry) -> usize {
        self.entries.push_back(Arc::new(entry));
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Find the most recent entry holding message `id` on endpoint `on`.
    #[must_use]
    pub fn find(&self, on: Endpoint, id: &MessageId) -> Option<Arc<LogEntry>> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.copies.iter().any(|c| c.to == on && c.message.id == *id))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().map(AsRef::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy(to: Endpoint, id: &str) -> MessageCopy {
        MessageCopy {
            to,
            message: Message {
                id: id.into(),
                ..Default::default()
            },
        }
    }

    const A: Endpoint = Endpoint::Bridged(0);
    const B: Endpoint = Endpoint::Bridged(1);
    const C: Endpoint = Endpoint::Bridged(2);

    #[test]
    fn finds_entry_by_copy_on_channel() {
        let mut log = CorrelationLog::default();
        log.append(LogEntry::new(A, vec![copy(B, "b1"), copy(C, "c1"), copy(A, "1")]));

        let entry = log.find(B, &"b1".into());
        assert_eq!(entry.as_deref().and_then(|e| e.copy_on(C)).map(|m| m.id.as_str()), Some("c1"));
        assert_eq!(entry.as_deref().map(LogEntry::origin), Some(A));

        // Ids are per channel: "b1" on C means nothing.
        assert!(log.find(C, &"b1".into()).is_none());
        assert!(log.find(A, &"missing".into()).is_none());
    }

    #[test]
    fn newest_entry_wins() {
        let mut log = CorrelationLog::default();
        log.append(LogEntry::new(A, vec![copy(A, "1"), copy(B, "old")]));
        log.append(LogEntry::new(A, vec![copy(A, "1"), copy(B, "new")]));

        let entry = log.find(A, &"1".into());
        assert_eq!(entry.as_deref().and_then(|e| e.copy_on(B)).map(|m| m.id.as_str()), Some("new"));
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut log = CorrelationLog::new(3);
        for i in 0..5 {
            let evicted = log.append(LogEntry::new(A, vec![copy(A, &i.to_string())]));
            assert_eq!(evicted, usize::from(i >= 3));
        }
        assert_eq!(log.len(), 3);
        assert!(log.find(A, &"0".into()).is_none());
        assert!(log.find(A, &"1".into()).is_none());
        assert!(log.find(A, &"4".into()).is_some());
        let ids: Vec<_> = log
            .iter()
            .map(|e| e.copies()[0].message.id.to_string())
            .collect();
        assert_eq!(ids, ["2", "3", "4"]);
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let mut log = CorrelationLog::new(0);
        log.append(LogEntry::new(A, vec![copy(A, "1")]));
        log.append(LogEntry::new(A, vec![copy(A, "2")]));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.len(), 1);
        assert!(log.find(A, &"2".into()).is_some());
    }

    #[test]
    fn with_ids_leaves_original_untouched() {
        let entry = LogEntry::new(A, vec![copy(A, "1"), copy(B, "b1"), copy(C, "c1")]);
        let edited = entry.with_ids(&[(A, "1e".into()), (B, "b2".into())]);

        assert_eq!(entry.copy_on(B).map(|m| m.id.as_str()), Some("b1"));
        assert_eq!(edited.copy_on(A).map(|m| m.id.as_str()), Some("1e"));
        assert_eq!(edited.copy_on(B).map(|m| m.id.as_str()), Some("b2"));
        assert_eq!(edited.copy_on(C).map(|m| m.id.as_str()), Some("c1"));
        assert_eq!(edited.origin(), A);
    }
}
