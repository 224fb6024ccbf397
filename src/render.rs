//! Output rendering for chat responses.
//!
//! This module provides the renderer trait the dialogue engine writes to, a
//! plain-text terminal implementation, and an in-memory implementation.

use std::io::{self, Stdout, Write};

/// ANSI escape code for bold text (used for the reply label).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for cyan text (used for the reply label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// ANSI escape code for dim text (used for informational messages).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Label printed in front of every reply.
const REPLY_LABEL: &str = "AI> ";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Capturing output in memory
pub trait Renderer: Send {
    /// Called once a streamed reply has been opened, before its first fragment.
    fn start_response(&mut self) {}

    /// Print a fragment of a streamed reply.
    ///
    /// This is called incrementally as fragments arrive, in arrival order.
    fn write_fragment(&mut self, text: &str);

    /// Print a whole reply at once.
    fn write_line(&mut self, text: &str);

    /// Called when a streamed reply ends, whether it completed or failed.
    ///
    /// Used to ensure proper newlines and cleanup after streaming.
    fn finish_response(&mut self) {}

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
        }
    }

    /// Flushes stdout to ensure immediate display of streamed content.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn label(&self) -> String {
        if self.use_color {
            format!("{ANSI_BOLD}{ANSI_CYAN}{REPLY_LABEL}{ANSI_RESET}")
        } else {
            REPLY_LABEL.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn start_response(&mut self) {
        print!("{}", self.label());
        self.flush();
    }

    fn write_fragment(&mut self, text: &str) {
        print!("{text}");
        self.flush();
    }

    fn write_line(&mut self, text: &str) {
        println!("{}{text}", self.label());
        self.flush();
    }

    fn finish_response(&mut self) {
        print!("\n\n");
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            println!("{ANSI_DIM}{info}{ANSI_RESET}");
        } else {
            println!("{info}");
        }
    }
}

/// A renderer that records everything written to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferRenderer {
    /// Streamed fragments, in arrival order.
    pub fragments: Vec<String>,
    /// Whole replies.
    pub lines: Vec<String>,
    /// Error messages.
    pub errors: Vec<String>,
    /// Informational messages.
    pub infos: Vec<String>,
    /// Number of streamed replies started.
    pub started: usize,
    /// Number of streamed replies finished.
    pub finished: usize,
}

impl BufferRenderer {
    /// Creates an empty BufferRenderer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything shown as reply text, concatenated.
    pub fn text(&self) -> String {
        let mut text = self.fragments.concat();
        text.push_str(&self.lines.concat());
        text
    }
}

impl Renderer for BufferRenderer {
    fn start_response(&mut self) {
        self.started += 1;
    }

    fn write_fragment(&mut self, text: &str) {
        self.fragments.push(text.to_string());
    }

    fn write_line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }

    fn finish_response(&mut self) {
        self.finished += 1;
    }

    fn print_error(&mut self, error: &str) {
        self.errors.push(error.to_string());
    }

    fn print_info(&mut self, info: &str) {
        self.infos.push(info.to_string());
    }
}
