//! TUI application state.

use crate::chat::message::{Message, MsgKind};

/// Maximum retained history entries.
const HISTORY_CAP: usize = 500;

/// State for the chat terminal interface.
pub struct App {
    /// Display name shown in the prompt; updated by `prompt` events.
    pub user: String,
    /// Current input line.
    pub input: String,
    /// Cursor position in characters.
    pub cursor: usize,
    /// Event history shown in the scrollback.
    pub messages: Vec<Message>,
    /// Lines scrolled up from the bottom.
    pub scroll_offset: usize,
    /// Set when the user asked to exit.
    pub should_quit: bool,
}

impl App {
    /// Create the initial state for the given user.
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            input: String::new(),
            cursor: 0,
            messages: Vec::with_capacity(256),
            scroll_offset: 0,
            should_quit: false,
        }
    }

    /// Append an event to the scrollback, trimming old history and
    /// snapping back to the bottom.
    pub fn push(&mut self, msg: Message) {
        if self.messages.len() >= HISTORY_CAP {
            let excess = self.messages.len() + 1 - HISTORY_CAP;
            self.messages.drain(..excess);
        }
        self.messages.push(msg);
        self.scroll_offset = 0;
    }

    fn byte_index(&self) -> usize {
        self.input
            .char_indices()
            .nth(self.cursor)
            .map(|(i, _)| i)
            .unwrap_or(self.input.len())
    }

    /// Insert a character at the cursor.
    pub fn enter_char(&mut self, c: char) {
        let index = self.byte_index();
        self.input.insert(index, c);
        self.cursor += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let index = self.byte_index();
        self.input.remove(index);
    }

    /// Delete the character after the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor >= self.input.chars().count() {
            return;
        }
        let index = self.byte_index();
        self.input.remove(index);
    }

    /// Move the cursor one character left.
    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Move the cursor one character right.
    pub fn move_cursor_right(&mut self) {
        let max = self.input.chars().count();
        if self.cursor < max {
            self.cursor += 1;
        }
    }

    /// Jump to the start of the input line.
    pub fn move_cursor_home(&mut self) {
        self.cursor = 0;
    }

    /// Jump to the end of the input line.
    pub fn move_cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    /// Take the input line, resetting the cursor.
    pub fn take_input(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.input)
    }

    /// Scroll the history up (towards older entries).
    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = (self.scroll_offset + lines).min(self.messages.len());
    }

    /// Scroll the history down (towards the newest entries).
    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Apply an incoming session event. Prompt updates change the user
    /// label instead of entering the scrollback.
    pub fn apply(&mut self, msg: Message) {
        match msg.kind {
            MsgKind::Prompt => {
                let trimmed = msg.body.trim();
                if !trimmed.is_empty() {
                    self.user = trimmed.to_string();
                }
            }
            _ => self.push(msg),
        }
    }
}
