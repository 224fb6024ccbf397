// Public modules
pub mod assist;
pub mod chat;
pub mod client;
pub mod conversation;
pub mod dialogue;
pub mod error;
pub mod gateway;
pub mod render;
pub mod types;

mod observability;
mod sse;

// Re-exports
pub use assist::{CodeAssist, CodeRequest, CodeTask};
pub use client::{API_KEY_ENV, OpenAi, mask_api_key};
pub use conversation::ConversationState;
pub use dialogue::DialogueEngine;
pub use error::{Error, Result};
pub use gateway::{ChatGateway, ChunkStream};
pub use observability::register_biometrics;
pub use render::{BufferRenderer, PlainTextRenderer, Renderer};
pub use types::*;
