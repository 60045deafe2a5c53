//! Bounded session log with eviction and autoscroll.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use tracing::{debug, trace};

use crate::{LogEntry, NoticeKind, SessionRecord, Settings, TimestampFormat};

/// Distance from the bottom (in lines) still treated as "at the bottom".
const AT_BOTTOM_THRESHOLD: usize = 3;

/// Display configuration for the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Maximum number of records kept.
    pub max_messages: usize,
    pub show_timestamps: bool,
    pub timestamp_format: TimestampFormat,
    pub font_family: String,
    pub font_size: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl LogConfig {
    /// Extract the log-related fields from the settings document.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_messages: settings.max_messages,
            show_timestamps: settings.show_timestamps,
            timestamp_format: settings.timestamp_format,
            font_family: settings.font_family.clone(),
            font_size: settings.font_size,
        }
    }
}

/// Result of the opportunistic JSON reformatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedContent {
    pub text: String,
    /// True when the content parsed as JSON and was pretty-printed.
    pub reformatted: bool,
}

/// Pretty-print `content` with two-space indentation if it parses as JSON.
///
/// Anything that does not parse is returned unchanged.
#[must_use]
pub fn try_format_json(content: &str) -> FormattedContent {
    serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|value| serde_json::to_string_pretty(&value).ok())
        .map_or_else(
            || FormattedContent {
                text: content.to_string(),
                reformatted: false,
            },
            |text| FormattedContent {
                text,
                reformatted: true,
            },
        )
}

/// Human-readable byte size: `B` below 1 KiB, then `KB` / `MB` with one decimal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

/// Wall-clock time of a record in the configured clock style.
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Local>, format: TimestampFormat) -> String {
    timestamp.format(format.pattern()).to_string()
}

/// "1 message" / "N messages".
#[must_use]
pub fn message_count_text(count: usize) -> String {
    if count == 1 {
        "1 message".to_string()
    } else {
        format!("{count} messages")
    }
}

/// A log entry together with its rendered lines.
#[derive(Debug, Clone)]
pub struct RenderedEntry {
    pub entry: LogEntry,
    /// Direction, timestamp and size line. `None` for notices.
    pub header: Option<String>,
    pub lines: Vec<String>,
    /// Content was pretty-printed JSON.
    pub is_json: bool,
}

impl RenderedEntry {
    fn render(entry: LogEntry, config: &LogConfig) -> Self {
        match entry {
            LogEntry::Record(record) => {
                let mut header = record.direction().label().to_string();
                if config.show_timestamps {
                    header.push_str("  ");
                    header.push_str(&format_timestamp(
                        &record.timestamp(),
                        config.timestamp_format,
                    ));
                }
                header.push_str("  ");
                header.push_str(&format_size(record.size_bytes()));

                let formatted = try_format_json(record.content());
                Self {
                    header: Some(header),
                    lines: split_lines(&formatted.text),
                    is_json: formatted.reformatted,
                    entry: LogEntry::Record(record),
                }
            }
            LogEntry::Notice { text, kind } => Self {
                header: None,
                lines: split_lines(&text),
                is_json: false,
                entry: LogEntry::Notice { text, kind },
            },
        }
    }

    /// Number of display lines, header included.
    #[must_use]
    pub fn line_count(&self) -> usize {
        usize::from(self.header.is_some()) + self.lines.len()
    }
}

fn split_lines(text: &str) -> Vec<String> {
    let lines: Vec<String> = text.lines().map(str::to_string).collect();
    if lines.is_empty() {
        vec![String::new()]
    } else {
        lines
    }
}

/// Ordered, size-bounded session log.
///
/// Records are kept in arrival order. Once more than `max_messages` records
/// are stored, the oldest are evicted one at a time. Notices share the
/// rendered surface and are dropped together with the records they precede.
///
/// The log also owns the viewport offset so that the autoscroll flag and
/// new-entry scrolling stay consistent.
#[derive(Debug)]
pub struct MessageLog {
    entries: VecDeque<RenderedEntry>,
    config: LogConfig,
    record_count: usize,
    notice_count: usize,
    total_lines: usize,
    offset: usize,
    visible_lines: usize,
    auto_scroll: bool,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(LogConfig::default())
    }
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new(config: LogConfig) -> Self {
        Self {
            entries: VecDeque::with_capacity(32),
            config,
            record_count: 0,
            notice_count: 0,
            total_lines: 0,
            offset: 0,
            visible_lines: 0,
            auto_scroll: true,
        }
    }

    /// Append a record, evict to the bound, and follow it if autoscrolling.
    pub fn add(&mut self, record: SessionRecord) {
        self.push(LogEntry::Record(record));
        self.record_count += 1;
        self.trim();
        self.follow();
    }

    /// Append a system notice.
    pub fn add_notice(&mut self, text: impl Into<String>, kind: NoticeKind) {
        self.push(LogEntry::Notice {
            text: text.into(),
            kind,
        });
        self.notice_count += 1;
        self.trim();
        self.follow();
    }

    fn push(&mut self, entry: LogEntry) {
        let rendered = RenderedEntry::render(entry, &self.config);
        self.total_lines += rendered.line_count();
        self.entries.push_back(rendered);
    }

    fn trim(&mut self) {
        while self.record_count > self.config.max_messages {
            self.evict_oldest_record();
        }
        while self.notice_count > self.config.max_messages {
            let Some(index) = self.entries.iter().position(|e| !e.entry.is_record()) else {
                break;
            };
            if let Some(removed) = self.entries.remove(index) {
                self.forget(&removed);
            }
        }
    }

    /// Pop entries from the front up to and including the oldest record.
    fn evict_oldest_record(&mut self) {
        while let Some(removed) = self.entries.pop_front() {
            self.forget(&removed);
            if let Some(record) = removed.entry.as_record() {
                trace!(id = %record.id(), "evicted oldest record");
                break;
            }
        }
    }

    fn forget(&mut self, removed: &RenderedEntry) {
        let lines = removed.line_count();
        self.total_lines = self.total_lines.saturating_sub(lines);
        self.offset = self.offset.saturating_sub(lines);
        if removed.entry.is_record() {
            self.record_count -= 1;
        } else {
            self.notice_count -= 1;
        }
    }

    fn follow(&mut self) {
        if self.auto_scroll {
            self.offset = self.max_offset();
        }
    }

    /// Remove every entry and reset the viewport. Configuration is kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.record_count = 0;
        self.notice_count = 0;
        self.total_lines = 0;
        self.offset = 0;
    }

    /// Apply new display settings, re-rendering and re-applying the bound.
    pub fn update_config(&mut self, config: LogConfig) {
        if config == self.config {
            return;
        }
        debug!(?config, "log config changed, re-rendering");
        self.config = config;
        let entries = std::mem::take(&mut self.entries);
        self.total_lines = 0;
        for rendered in entries {
            self.push(rendered.entry);
        }
        self.trim();
        self.clamp_offset();
        self.follow();
    }

    #[must_use]
    pub const fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Stored records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &SessionRecord> {
        self.entries.iter().filter_map(|e| e.entry.as_record())
    }

    /// Rendered surface, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &RenderedEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub const fn record_count(&self) -> usize {
        self.record_count
    }

    #[must_use]
    pub fn message_count_text(&self) -> String {
        message_count_text(self.record_count)
    }

    // ── Viewport ────────────────────────────────────────────────────────

    /// Total rendered lines.
    #[must_use]
    pub const fn total_lines(&self) -> usize {
        self.total_lines
    }

    /// Current top line of the viewport.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Whether new entries scroll the view to the bottom.
    #[must_use]
    pub const fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    /// Whether a "scroll to bottom" affordance should be offered.
    #[must_use]
    pub const fn show_scroll_button(&self) -> bool {
        !self.auto_scroll
    }

    /// Record the viewport height (set by the renderer).
    pub fn set_visible_lines(&mut self, lines: usize) {
        self.visible_lines = lines;
        if self.auto_scroll {
            self.offset = self.max_offset();
        } else {
            self.clamp_offset();
        }
    }

    const fn max_offset(&self) -> usize {
        self.total_lines.saturating_sub(self.visible_lines)
    }

    fn clamp_offset(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }

    /// True when the viewport is within the threshold of the bottom.
    #[must_use]
    pub const fn is_at_bottom(&self) -> bool {
        self.max_offset().saturating_sub(self.offset) < AT_BOTTOM_THRESHOLD
    }

    /// A scroll event moved the viewport to `offset`.
    ///
    /// Autoscroll follows whether the new position is near the bottom.
    pub fn on_scroll(&mut self, offset: usize) {
        self.offset = offset.min(self.max_offset());
        self.auto_scroll = self.is_at_bottom();
    }

    /// Scroll up by n lines
    pub fn scroll_up(&mut self, n: usize) {
        self.on_scroll(self.offset.saturating_sub(n));
    }

    /// Scroll down by n lines
    pub fn scroll_down(&mut self, n: usize) {
        self.on_scroll(self.offset.saturating_add(n));
    }

    /// Page up
    pub fn page_up(&mut self) {
        self.scroll_up(self.visible_lines.saturating_sub(2).max(1));
    }

    /// Page down
    pub fn page_down(&mut self) {
        self.scroll_down(self.visible_lines.saturating_sub(2).max(1));
    }

    /// Jump to the newest entry and re-enable autoscroll.
    pub fn scroll_to_bottom(&mut self) {
        self.offset = self.max_offset();
        self.auto_scroll = true;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::Direction;

    fn config(max_messages: usize) -> LogConfig {
        LogConfig {
            max_messages,
            ..LogConfig::default()
        }
    }

    fn contents(log: &MessageLog) -> Vec<String> {
        log.records().map(|r| r.content().to_string()).collect()
    }

    #[test]
    fn test_bound_keeps_most_recent_in_order() {
        let max = 5;
        let mut log = MessageLog::new(config(max));
        for i in 0..23usize {
            log.add(SessionRecord::received(format!("m{i}")));
            assert!(log.record_count() <= max);
            let expected: Vec<String> = (0..=i)
                .skip((i + 1).saturating_sub(max))
                .map(|n| format!("m{n}"))
                .collect();
            assert_eq!(contents(&log), expected);
        }
    }

    #[test]
    fn test_add_at_bound_evicts_exactly_oldest() {
        let mut log = MessageLog::new(config(3));
        log.add(SessionRecord::sent("a"));
        log.add(SessionRecord::sent("b"));
        log.add(SessionRecord::sent("c"));
        assert_eq!(log.record_count(), 3);

        log.add(SessionRecord::sent("d"));
        assert_eq!(log.record_count(), 3);
        assert_eq!(contents(&log), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_notices_do_not_count_toward_bound() {
        let mut log = MessageLog::new(config(2));
        log.add_notice("Connecting", NoticeKind::Info);
        log.add(SessionRecord::sent("a"));
        log.add_notice("between", NoticeKind::Info);
        log.add(SessionRecord::sent("b"));
        assert_eq!(log.record_count(), 2);
        assert_eq!(log.entries().count(), 4);

        // Evicting "a" also drops the notice that preceded it.
        log.add(SessionRecord::sent("c"));
        assert_eq!(contents(&log), vec!["b", "c"]);
        let first = log.entries().next().unwrap();
        assert!(matches!(&first.entry, LogEntry::Notice { text, .. } if text == "between"));
    }

    #[test]
    fn test_notices_are_bounded_too() {
        let mut log = MessageLog::new(config(2));
        for i in 0..5 {
            log.add_notice(format!("n{i}"), NoticeKind::Error);
        }
        assert_eq!(log.entries().count(), 2);
    }

    #[test]
    fn test_try_format_json() {
        let formatted = try_format_json(r#"{"b":1,"a":[true]}"#);
        assert!(formatted.reformatted);
        assert_eq!(formatted.text, "{\n  \"b\": 1,\n  \"a\": [\n    true\n  ]\n}");

        let raw = try_format_json("hello {");
        assert!(!raw.reformatted);
        assert_eq!(raw.text, "hello {");
    }

    #[test]
    fn test_json_records_render_pretty() {
        let mut log = MessageLog::default();
        log.add(SessionRecord::received(r#"{"ok":true}"#));
        let entry = log.entries().next().unwrap();
        assert!(entry.is_json);
        assert_eq!(entry.lines, vec!["{", "  \"ok\": true", "}"]);
        // The stored record is untouched.
        assert_eq!(log.records().next().unwrap().content(), r#"{"ok":true}"#);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_header_timestamp_formats() {
        let ts = Local.with_ymd_and_hms(2024, 1, 1, 13, 5, 9).single().unwrap();
        assert_eq!(format_timestamp(&ts, TimestampFormat::TwentyFourHour), "13:05:09");
        assert_eq!(format_timestamp(&ts, TimestampFormat::TwelveHour), "01:05:09 PM");

        let mut log = MessageLog::default();
        log.add(SessionRecord::with_timestamp(Direction::Sent, "ab", ts));
        let header = log.entries().next().unwrap().header.clone().unwrap();
        assert_eq!(header, "↑ SENT  13:05:09  2 B");

        log.update_config(LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        });
        let header = log.entries().next().unwrap().header.clone().unwrap();
        assert_eq!(header, "↑ SENT  2 B");
    }

    #[test]
    fn test_message_count_text() {
        assert_eq!(message_count_text(0), "0 messages");
        assert_eq!(message_count_text(1), "1 message");
        assert_eq!(message_count_text(7), "7 messages");
    }

    #[test]
    fn test_clear_keeps_config() {
        let mut log = MessageLog::new(config(4));
        log.add(SessionRecord::sent("a"));
        log.add_notice("x", NoticeKind::Success);
        log.clear();
        assert_eq!(log.record_count(), 0);
        assert_eq!(log.entries().count(), 0);
        assert_eq!(log.total_lines(), 0);
        assert_eq!(log.config().max_messages, 4);
    }

    #[test]
    fn test_shrinking_bound_trims_immediately() {
        let mut log = MessageLog::new(config(10));
        for i in 0..6 {
            log.add(SessionRecord::sent(format!("{i}")));
        }
        log.update_config(config(2));
        assert_eq!(contents(&log), vec!["4", "5"]);
    }

    #[test]
    fn test_autoscroll_follows_new_entries() {
        let mut log = MessageLog::default();
        log.set_visible_lines(4);
        for i in 0..10 {
            log.add(SessionRecord::sent(format!("{i}")));
        }
        // Each record renders as header + one line.
        assert_eq!(log.total_lines(), 20);
        assert_eq!(log.offset(), 16);
        assert!(log.auto_scroll());
    }

    #[test]
    fn test_scrolling_away_suspends_autoscroll() {
        let mut log = MessageLog::default();
        log.set_visible_lines(4);
        for i in 0..10 {
            log.add(SessionRecord::sent(format!("{i}")));
        }
        log.scroll_up(10);
        assert!(!log.auto_scroll());
        assert!(log.show_scroll_button());
        assert_eq!(log.offset(), 6);

        log.add(SessionRecord::sent("new"));
        assert_eq!(log.offset(), 6);

        log.scroll_to_bottom();
        assert!(log.auto_scroll());
        assert_eq!(log.offset(), 18);
    }

    #[test]
    fn test_scroll_near_bottom_counts_as_bottom() {
        let mut log = MessageLog::default();
        log.set_visible_lines(4);
        for i in 0..10 {
            log.add(SessionRecord::sent(format!("{i}")));
        }
        log.scroll_up(2);
        assert!(log.auto_scroll());
        log.scroll_up(1);
        assert!(!log.auto_scroll());
        log.scroll_down(1);
        assert!(log.auto_scroll());
    }
}
