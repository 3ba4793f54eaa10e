//! Editing-widget boundary
//!
//! The text widget itself is an external collaborator; the engine only needs
//! an opaque buffer with a settable value, cursor/scroll capture and change
//! notifications tagged with their origin. [`MemoryBuffer`] is the
//! in-process implementation used by tests and headless sessions.

use crate::errors::{CoeditError, Result};
use crate::types::RoomId;

// ----------------------------------------------------------------------------
// Change Origin
// ----------------------------------------------------------------------------

/// Origin tag on a widget change notification. Only genuine user input is
/// ever broadcast; programmatic sets (including our own remote applies) are
/// filtered out by the convergence engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    UserInput,
    Programmatic,
}

// ----------------------------------------------------------------------------
// Cursor & Scroll
// ----------------------------------------------------------------------------

/// Caret position in the widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPos {
    pub line: u32,
    pub column: u32,
}

/// Viewport scroll offsets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollInfo {
    pub left: f64,
    pub top: f64,
}

// ----------------------------------------------------------------------------
// Editor Buffer Trait
// ----------------------------------------------------------------------------

/// Contract the sync engine holds against the editing widget.
pub trait EditorBuffer: Send {
    fn value(&self) -> String;

    /// Replace the whole buffer value. May fail if the widget rejects the
    /// update; the caller must still exit its suppression window cleanly.
    fn set_value(&mut self, text: &str) -> Result<()>;

    fn cursor(&self) -> CursorPos;
    fn set_cursor(&mut self, pos: CursorPos);

    fn scroll_info(&self) -> ScrollInfo;
    fn scroll_to(&mut self, scroll: ScrollInfo);
}

// ----------------------------------------------------------------------------
// Memory Buffer
// ----------------------------------------------------------------------------

/// Plain in-memory buffer implementing the widget contract.
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    text: String,
    cursor: CursorPos,
    scroll: ScrollInfo,
    poisoned: Option<String>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Make the next `set_value` fail with the given reason. Test hook for
    /// the apply-failure recovery path.
    pub fn poison_next_set(&mut self, reason: impl Into<String>) {
        self.poisoned = Some(reason.into());
    }
}

impl EditorBuffer for MemoryBuffer {
    fn value(&self) -> String {
        self.text.clone()
    }

    fn set_value(&mut self, text: &str) -> Result<()> {
        if let Some(reason) = self.poisoned.take() {
            return Err(CoeditError::apply_failed(RoomId::from("<buffer>"), reason));
        }
        self.text = text.to_string();
        Ok(())
    }

    fn cursor(&self) -> CursorPos {
        self.cursor
    }

    fn set_cursor(&mut self, pos: CursorPos) {
        self.cursor = pos;
    }

    fn scroll_info(&self) -> ScrollInfo {
        self.scroll
    }

    fn scroll_to(&mut self, scroll: ScrollInfo) {
        self.scroll = scroll;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_buffer_set_and_restore() {
        let mut buffer = MemoryBuffer::with_text("fn main() {}");
        buffer.set_cursor(CursorPos { line: 0, column: 4 });
        buffer.scroll_to(ScrollInfo { left: 0.0, top: 12.0 });

        buffer.set_value("fn main() { println!(); }").unwrap();
        assert_eq!(buffer.value(), "fn main() { println!(); }");
        assert_eq!(buffer.cursor(), CursorPos { line: 0, column: 4 });
        assert_eq!(buffer.scroll_info().top, 12.0);
    }

    #[test]
    fn test_poisoned_set_fails_once() {
        let mut buffer = MemoryBuffer::with_text("a");
        buffer.poison_next_set("widget detached");
        assert!(buffer.set_value("b").is_err());
        assert_eq!(buffer.value(), "a");
        // Poison is one-shot.
        assert!(buffer.set_value("b").is_ok());
        assert_eq!(buffer.value(), "b");
    }
}
