//! Message composer input with submitted-message history.

/// Composer input buffer and its history of submitted messages.
///
/// History is navigated backwards from the newest entry. The first step
/// back saves the in-progress input, which is restored when stepping forward
/// past the newest entry. Navigation is only allowed with the caret at the
/// start (back) or end (forward) of the input so normal caret movement in
/// multi-line input is left alone.
#[derive(Debug, Clone)]
pub struct ComposerHistory {
    entries: Vec<String>,
    /// Steps back from the newest entry; `None` when not navigating.
    cursor: Option<usize>,
    scratch: String,
    input: String,
    /// Caret position in chars.
    caret: usize,
    enabled: bool,
}

impl Default for ComposerHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ComposerHistory {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: None,
            scratch: String::new(),
            input: String::new(),
            caret: 0,
            enabled: true,
        }
    }

    /// Take the current input as a submitted message.
    ///
    /// Returns `None` and keeps the input if it is blank. Otherwise the input
    /// is cleared, appended to history unless it repeats the last entry, and
    /// navigation is reset.
    pub fn submit(&mut self) -> Option<String> {
        if self.input.trim().is_empty() {
            return None;
        }
        let message = std::mem::take(&mut self.input);
        if self.entries.last() != Some(&message) {
            self.entries.push(message.clone());
        }
        self.cursor = None;
        self.scratch.clear();
        self.caret = 0;
        Some(message)
    }

    /// Step to an older entry. Requires the caret at the start of the input.
    ///
    /// Returns whether the input changed.
    pub fn navigate_back(&mut self) -> bool {
        if !self.caret_at_start() || self.entries.is_empty() {
            return false;
        }
        let next = self.cursor.map_or(0, |c| c + 1);
        if next >= self.entries.len() {
            return false;
        }
        if self.cursor.is_none() {
            self.scratch = self.input.clone();
        }
        self.cursor = Some(next);
        let entry = self.entries[self.entries.len() - 1 - next].clone();
        self.replace_input(entry);
        true
    }

    /// Step to a newer entry, or back to the saved input. Requires the caret
    /// at the end of the input.
    ///
    /// Returns whether the input changed.
    pub fn navigate_forward(&mut self) -> bool {
        if !self.caret_at_end() {
            return false;
        }
        let Some(cursor) = self.cursor else {
            return false;
        };
        if cursor == 0 {
            self.cursor = None;
            let scratch = std::mem::take(&mut self.scratch);
            self.replace_input(scratch);
        } else {
            self.cursor = Some(cursor - 1);
            let entry = self.entries[self.entries.len() - cursor].clone();
            self.replace_input(entry);
        }
        true
    }

    fn replace_input(&mut self, text: String) {
        self.input = text;
        self.caret = self.char_len();
    }

    /// Submitted messages, oldest first.
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.entries
    }

    /// Forget all history and any navigation in progress.
    pub fn clear_history(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.scratch.clear();
    }

    /// Whether history navigation is in progress.
    #[must_use]
    pub const fn is_navigating(&self) -> bool {
        self.cursor.is_some()
    }

    // ── Input editing ───────────────────────────────────────────────────

    #[must_use]
    pub fn value(&self) -> &str {
        &self.input
    }

    /// Replace the input and move the caret to its end.
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.replace_input(value.into());
    }

    #[must_use]
    pub const fn caret(&self) -> usize {
        self.caret
    }

    #[must_use]
    pub const fn caret_at_start(&self) -> bool {
        self.caret == 0
    }

    #[must_use]
    pub fn caret_at_end(&self) -> bool {
        self.caret == self.char_len()
    }

    fn char_len(&self) -> usize {
        self.input.chars().count()
    }

    fn byte_index(&self, caret: usize) -> usize {
        self.input
            .char_indices()
            .nth(caret)
            .map_or(self.input.len(), |(i, _)| i)
    }

    pub fn insert_char(&mut self, c: char) {
        if !self.enabled {
            return;
        }
        let at = self.byte_index(self.caret);
        self.input.insert(at, c);
        self.caret += 1;
    }

    /// Delete the char before the caret.
    pub fn backspace(&mut self) {
        if !self.enabled || self.caret == 0 {
            return;
        }
        self.caret -= 1;
        let at = self.byte_index(self.caret);
        self.input.remove(at);
    }

    /// Delete the char under the caret.
    pub fn delete(&mut self) {
        if !self.enabled || self.caret_at_end() {
            return;
        }
        let at = self.byte_index(self.caret);
        self.input.remove(at);
    }

    pub fn move_left(&mut self) {
        self.caret = self.caret.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.caret = (self.caret + 1).min(self.char_len());
    }

    pub const fn move_home(&mut self) {
        self.caret = 0;
    }

    pub fn move_end(&mut self) {
        self.caret = self.char_len();
    }

    /// Disabled composers ignore edits.
    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}
