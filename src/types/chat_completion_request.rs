use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Model};

/// Parameters for a chat completion call.
///
/// A request is built fresh for every call and never kept afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    /// The model that will complete the conversation.
    pub model: Model,

    /// The messages to complete, oldest first.
    pub messages: Vec<ChatMessage>,

    /// Whether the response is delivered as a stream of chunks.
    #[serde(default)]
    pub stream: bool,

    /// The maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatCompletionRequest {
    /// Create a new non-streaming request.
    pub fn new(model: Model, messages: Vec<ChatMessage>) -> Self {
        Self {
            model,
            messages,
            stream: false,
            max_tokens: None,
        }
    }

    /// Set whether the response should be streamed.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}
