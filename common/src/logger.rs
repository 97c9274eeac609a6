// Line-buffering text sink

use std::sync::{Arc, Mutex};

#[cfg(test)]
use mockall::automock;

/// Destination a [`LineLogger`] renders into.
///
/// The logger re-renders its entire buffer after every mutation, so a target
/// always receives the full joined text, not an increment.
#[cfg_attr(test, automock)]
pub trait RenderTarget: Send {
    fn render(&mut self, text: &str);
}

/// Shared in-memory render target.
///
/// Cloning yields another handle onto the same buffer, so a test or embedder
/// can keep one clone for reading while the logger owns the other.
#[derive(Clone, Default)]
pub struct BufferTarget {
    buffer: Arc<Mutex<String>>,
}

impl BufferTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rendered text.
    pub fn contents(&self) -> String {
        self.buffer.lock().expect("buffer lock poisoned").clone()
    }
}

impl RenderTarget for BufferTarget {
    fn render(&mut self, text: &str) {
        let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
        buffer.clear();
        buffer.push_str(text);
    }
}

/// Append-only line buffer that mirrors itself into a render target.
pub struct LineLogger {
    lines: Vec<String>,
    target: Box<dyn RenderTarget>,
}

impl LineLogger {
    pub fn new(target: Box<dyn RenderTarget>) -> Self {
        Self {
            lines: Vec::new(),
            target,
        }
    }

    /// Append a line and re-render the full buffer.
    pub fn log(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
        let text = self.lines.join("\n");
        self.target.render(&text);
    }

    /// Drop all buffered lines and render the empty string.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.target.render("");
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_appends_and_renders_joined_buffer() {
        let target = BufferTarget::new();
        let mut logger = LineLogger::new(Box::new(target.clone()));

        logger.log("first");
        logger.log("second");

        assert_eq!(logger.lines(), &["first", "second"]);
        assert_eq!(target.contents(), "first\nsecond");
    }

    #[test]
    fn test_clear_empties_buffer_and_target() {
        let target = BufferTarget::new();
        let mut logger = LineLogger::new(Box::new(target.clone()));

        logger.log("line");
        logger.clear();

        assert!(logger.lines().is_empty());
        assert_eq!(target.contents(), "");
    }

    #[test]
    fn test_target_receives_full_text_on_every_log() {
        let mut mock = MockRenderTarget::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_render()
            .withf(|text| text == "a")
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        mock.expect_render()
            .withf(|text| text == "a\nb")
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mut logger = LineLogger::new(Box::new(mock));
        logger.log("a");
        logger.log("b");
    }

    #[test]
    fn test_logging_after_clear_starts_fresh() {
        let target = BufferTarget::new();
        let mut logger = LineLogger::new(Box::new(target.clone()));

        logger.log("old");
        logger.clear();
        logger.log("new");

        assert_eq!(target.contents(), "new");
    }
}
