//! Chat application module for interactive conversations.
//!
//! This module provides the pieces of the REPL built on top of the confab
//! library:
//!
//! - [`config`]: CLI arguments, environment and YAML configuration
//! - [`commands`]: directive parsing (`:help`, `:testgen`, ...)
//! - [`session`]: the chat session that owns the conversation

mod commands;
mod config;
mod session;

pub use crate::render::{BufferRenderer, PlainTextRenderer, Renderer};
pub use commands::{DIRECTIVE_MARKER, Directive, help_text, parse_directive, version_text};
pub use config::{
    CONFIG_FILE_NAME, ChatArgs, ChatConfig, CommandConfig, ENV_FILE_NAME, FileConfig,
    executable_dir, load_env, load_file_config,
};
pub use session::ChatSession;
