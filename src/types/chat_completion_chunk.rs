use serde::{Deserialize, Deserializer, Serialize};

use crate::types::Role;

/// The incremental part of a streamed choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkDelta {
    /// Present on the first chunk of a choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// The next fragment of text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One streamed choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkChoice {
    /// Position of this choice in the response.
    #[serde(default)]
    pub index: u32,

    /// The fragment carried by this chunk.
    #[serde(default, deserialize_with = "null_as_default")]
    pub delta: ChunkDelta,

    /// Set on the last chunk of a choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A single delta of a streamed chat completion.
///
/// Providers occasionally send chunks with an empty `choices` list as
/// keep-alives; those carry no fragment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatCompletionChunk {
    /// Provider-assigned identifier, shared by every chunk of a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The model that produced the chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// The streamed choices.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// Create a chunk carrying one text fragment.
    pub fn text(fragment: impl Into<String>) -> Self {
        Self {
            id: None,
            model: None,
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(fragment.into()),
                },
                finish_reason: None,
            }],
        }
    }

    /// Create a chunk with no choices.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The text fragment of the first choice.
    ///
    /// Returns `None` when the chunk has no choices at all, and the empty string
    /// when the first choice carries no content (a role-only or finish chunk).
    pub fn fragment(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|choice| choice.delta.content.as_deref().unwrap_or(""))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
