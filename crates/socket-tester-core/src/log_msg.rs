//! Typed log entries.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Written by this client.
    Sent,
    /// Delivered by the remote endpoint.
    Received,
}

impl Direction {
    /// Header label shown above the frame content.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sent => "↑ SENT",
            Self::Received => "↓ RECEIVED",
        }
    }
}

/// One sent or received text frame.
///
/// Fields are private so a record cannot change once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    id: Uuid,
    direction: Direction,
    content: String,
    timestamp: DateTime<Local>,
    size_bytes: usize,
}

impl SessionRecord {
    /// Create a record stamped with the current local time.
    #[must_use]
    pub fn new(direction: Direction, content: impl Into<String>) -> Self {
        Self::with_timestamp(direction, content, Local::now())
    }

    /// Create a record with an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(
        direction: Direction,
        content: impl Into<String>,
        timestamp: DateTime<Local>,
    ) -> Self {
        let content = content.into();
        // UTF-8 byte length, not char count.
        let size_bytes = content.len();
        Self {
            id: Uuid::new_v4(),
            direction,
            content,
            timestamp,
            size_bytes,
        }
    }

    /// Shorthand for a sent frame.
    #[must_use]
    pub fn sent(content: impl Into<String>) -> Self {
        Self::new(Direction::Sent, content)
    }

    /// Shorthand for a received frame.
    #[must_use]
    pub fn received(content: impl Into<String>) -> Self {
        Self::new(Direction::Received, content)
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Encoded size of the content in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

/// Severity of a system notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Info,
    Error,
    Success,
}

/// Entry shown in the session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEntry {
    /// A sent or received frame. Counts toward the log bound.
    Record(SessionRecord),
    /// A one-line system notice (connected, errors, ...).
    Notice { text: String, kind: NoticeKind },
}

impl LogEntry {
    /// Returns the record if this entry is one.
    #[must_use]
    pub const fn as_record(&self) -> Option<&SessionRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Notice { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_is_byte_length() {
        assert_eq!(SessionRecord::sent("ab").size_bytes(), 2);
        // 'é' encodes to two bytes
        let record = SessionRecord::received("é");
        assert_eq!(record.content().chars().count(), 1);
        assert_eq!(record.size_bytes(), 2);
        assert_eq!(SessionRecord::sent("日本").size_bytes(), 6);
    }

    #[test]
    fn test_records_get_unique_ids() {
        let a = SessionRecord::sent("x");
        let b = SessionRecord::sent("x");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_direction_labels() {
        assert_eq!(Direction::Sent.label(), "↑ SENT");
        assert_eq!(Direction::Received.label(), "↓ RECEIVED");
    }
}
