//! Crossterm key mapping for terminal front ends.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use socket_tester_core::ComposerHistory;

/// What a key press asks the application to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Send the composer input, or connect from the address field.
    Submit,
    HistoryPrevious,
    HistoryNext,
    Insert(char),
    Backspace,
    Delete,
    CursorLeft,
    CursorRight,
    CursorHome,
    CursorEnd,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    ScrollToBottom,
    /// Move focus between the address field and the composer.
    SwitchFocus,
    ToggleConnection,
    ClearLog,
    SaveEndpoint,
    NextEndpoint,
    Quit,
}

/// Map a crossterm key event to an action.
#[must_use]
pub fn key_to_action(key: &KeyEvent) -> Option<KeyAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    let action = match key.code {
        KeyCode::Char(c) if ctrl => match c.to_ascii_lowercase() {
            'c' | 'q' => KeyAction::Quit,
            'd' => KeyAction::ToggleConnection,
            'l' => KeyAction::ClearLog,
            's' => KeyAction::SaveEndpoint,
            'n' => KeyAction::NextEndpoint,
            'j' => KeyAction::Submit,
            _ => return None,
        },
        KeyCode::Char(c) => KeyAction::Insert(c),
        // Plain Enter and Ctrl+Enter both send.
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Backspace => KeyAction::Backspace,
        KeyCode::Delete => KeyAction::Delete,
        KeyCode::Tab | KeyCode::BackTab => KeyAction::SwitchFocus,
        KeyCode::Esc => KeyAction::Quit,
        KeyCode::Up if ctrl => KeyAction::ScrollUp,
        KeyCode::Down if ctrl => KeyAction::ScrollDown,
        KeyCode::Up => KeyAction::HistoryPrevious,
        KeyCode::Down => KeyAction::HistoryNext,
        KeyCode::Left => KeyAction::CursorLeft,
        KeyCode::Right => KeyAction::CursorRight,
        KeyCode::Home => KeyAction::CursorHome,
        KeyCode::End if ctrl => KeyAction::ScrollToBottom,
        KeyCode::End => KeyAction::CursorEnd,
        KeyCode::PageUp => KeyAction::PageUp,
        KeyCode::PageDown => KeyAction::PageDown,
        _ => return None,
    };
    Some(action)
}

/// Map a terminal event. Only key presses produce actions.
#[must_use]
pub fn event_to_action(event: &Event) -> Option<KeyAction> {
    match event {
        Event::Key(key) => key_to_action(key),
        _ => None,
    }
}

/// Apply an editing action to a composer.
///
/// History actions only take effect when the caret allows it. Returns
/// whether the action is an editing action.
pub fn apply_edit(composer: &mut ComposerHistory, action: KeyAction) -> bool {
    match action {
        KeyAction::Insert(c) => composer.insert_char(c),
        KeyAction::Backspace => composer.backspace(),
        KeyAction::Delete => composer.delete(),
        KeyAction::CursorLeft => composer.move_left(),
        KeyAction::CursorRight => composer.move_right(),
        KeyAction::CursorHome => composer.move_home(),
        KeyAction::CursorEnd => composer.move_end(),
        KeyAction::HistoryPrevious => {
            composer.navigate_back();
        }
        KeyAction::HistoryNext => {
            composer.navigate_forward();
        }
        _ => return false,
    }
    true
}
