use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Token accounting reported with a completion.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// Tokens consumed by the prompt.
    #[serde(default)]
    pub prompt_tokens: u32,

    /// Tokens generated for the completion.
    #[serde(default)]
    pub completion_tokens: u32,

    /// Sum of prompt and completion tokens.
    #[serde(default)]
    pub total_tokens: u32,
}

/// One alternative completion of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Choice {
    /// Position of this choice in the response.
    #[serde(default)]
    pub index: u32,

    /// The generated message.
    pub message: ChatMessage,

    /// Why generation stopped, e.g. `stop` or `length`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A complete (non-streamed) chat completion response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    /// Provider-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The model that produced the completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// The completion choices, in provider order.
    #[serde(default)]
    pub choices: Vec<Choice>,

    /// Token usage, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Create a response holding the given choices and nothing else.
    pub fn from_choices(choices: Vec<Choice>) -> Self {
        Self {
            id: None,
            model: None,
            choices,
            usage: None,
        }
    }

    /// Create a response with a single assistant choice.
    pub fn from_text(content: impl Into<String>) -> Self {
        Self::from_choices(vec![Choice {
            index: 0,
            message: ChatMessage::assistant(content),
            finish_reason: Some("stop".to_string()),
        }])
    }
}
